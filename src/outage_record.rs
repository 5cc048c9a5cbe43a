use chrono::NaiveDateTime;
use geo::Point;

/**
 * One customer affected by an outage.
 *
 * This is a single row from the outage system. The location is in the input coordinate system,
 * it has not been projected yet.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct OutageRecord {
    /// The outage event this customer is part of.
    pub event_id: i64,
    /// The supply node (e.g. transformer) that feeds this customer.
    pub supply_node: i64,
    /// Location of the customer, x is easting or longitude.
    pub location: Point<f64>,
    pub cause: String,
    /// Estimated time of restoral, already formatted for display by the outage system.
    pub etor: String,
    /// Number of customers affected by the whole event.
    pub customer_count: i64,
    pub event_begin: Option<NaiveDateTime>,
    /// Time the first crew was dispatched, only its presence matters.
    pub first_crew_time: Option<NaiveDateTime>,
}

impl OutageRecord {
    /// The event start time formatted for display, e.g. "3:07 PM, 01/19".
    pub fn begin_text(&self) -> String {
        match self.event_begin {
            Some(begin) => begin.format("%-I:%M %p, %m/%d").to_string(),
            None => "unknown".to_owned(),
        }
    }

    pub fn crew_dispatched_text(&self) -> Option<&'static str> {
        self.first_crew_time.map(|_| "Dispatched")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::NaiveDate;

    fn record() -> OutageRecord {
        OutageRecord {
            event_id: 1,
            supply_node: 2,
            location: Point::new(1257035.47, 287618.35),
            cause: "Tree".to_owned(),
            etor: "Est. restoration: 5:00 PM".to_owned(),
            customer_count: 12,
            event_begin: None,
            first_crew_time: None,
        }
    }

    #[test]
    fn test_begin_text() {
        let mut rec = record();
        assert_eq!(rec.begin_text(), "unknown");

        rec.event_begin = NaiveDate::from_ymd_opt(2022, 1, 19).and_then(|d| d.and_hms_opt(15, 7, 0));
        assert_eq!(rec.begin_text(), "3:07 PM, 01/19");

        rec.event_begin = NaiveDate::from_ymd_opt(2022, 11, 3).and_then(|d| d.and_hms_opt(0, 45, 0));
        assert_eq!(rec.begin_text(), "12:45 AM, 11/03");
    }

    #[test]
    fn test_crew_dispatched_text() {
        let mut rec = record();
        assert_eq!(rec.crew_dispatched_text(), None);

        rec.first_crew_time = NaiveDate::from_ymd_opt(2022, 1, 19).and_then(|d| d.and_hms_opt(15, 30, 0));
        assert_eq!(rec.crew_dispatched_text(), Some("Dispatched"));
    }
}
