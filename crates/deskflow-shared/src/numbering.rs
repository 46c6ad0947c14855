//! Human-readable ticket and document numbers.
//!
//! Formats:
//! - ticket:   `{serial}/SV-HR/{code}/{roman month}/{year}`
//! - document: `{serial}/SV-HR/{ordinal}-{code}/{roman month}/{year}`
//!
//! The month and year come from the instant passed in, so callers must supply
//! it from a [`Clock`](crate::clock::Clock) rather than reading the wall clock
//! here.

use chrono::{DateTime, Datelike, Utc};

use crate::constants::NUMBER_AUTHORITY;
use crate::types::TicketType;

const ROMAN_MONTHS: [&str; 12] = [
    "I", "II", "III", "IV", "V", "VI", "VII", "VIII", "IX", "X", "XI", "XII",
];

/// Roman numeral for the month of `at` (I..=XII).
pub fn roman_month(at: DateTime<Utc>) -> &'static str {
    ROMAN_MONTHS[at.month0() as usize]
}

pub fn ticket_number(serial: u64, ticket_type: TicketType, at: DateTime<Utc>) -> String {
    format!(
        "{}/{}/{}/{}/{}",
        serial,
        NUMBER_AUTHORITY,
        ticket_type.code(),
        roman_month(at),
        at.year()
    )
}

/// `ordinal` is the 1-based position of the document within its activity.
pub fn document_number(
    serial: u64,
    ticket_type: TicketType,
    ordinal: u32,
    at: DateTime<Utc>,
) -> String {
    format!(
        "{}/{}/{}-{}/{}/{}",
        serial,
        NUMBER_AUTHORITY,
        ordinal,
        ticket_type.code(),
        roman_month(at),
        at.year()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 9, 30, 0).unwrap()
    }

    #[test]
    fn incident_report_ticket_number() {
        let ticket_type: TicketType = "Incident Report".parse().unwrap();
        assert_eq!(
            ticket_number(7, ticket_type, at(2024, 3, 15)),
            "7/SV-HR/INC/III/2024"
        );
    }

    #[test]
    fn document_number_embeds_ordinal() {
        assert_eq!(
            document_number(12, TicketType::RequestFulfillment, 2, at(2023, 12, 1)),
            "12/SV-HR/2-REQ/XII/2023"
        );
    }

    #[test]
    fn every_month_has_a_numeral() {
        let months: Vec<&str> = (1..=12).map(|m| roman_month(at(2024, m, 1))).collect();
        assert_eq!(months, ROMAN_MONTHS.to_vec());
    }

    proptest! {
        #[test]
        fn prop_ticket_number_is_deterministic(
            serial in 1u64..1_000_000,
            type_idx in 0usize..TicketType::ALL.len(),
            year in 2000i32..2100,
            month in 1u32..=12,
            day in 1u32..=28,
        ) {
            let ticket_type = TicketType::ALL[type_idx];
            let when = at(year, month, day);

            let first = ticket_number(serial, ticket_type, when);
            let second = ticket_number(serial, ticket_type, when);
            prop_assert_eq!(&first, &second);

            let expected_prefix = format!("{}/SV-HR/{}/", serial, ticket_type.code());
            prop_assert!(first.starts_with(&expected_prefix));
            let expected_suffix = format!("/{}", year);
            prop_assert!(first.ends_with(&expected_suffix));
        }

        #[test]
        fn prop_distinct_serials_give_distinct_numbers(
            a in 1u64..1_000_000,
            b in 1u64..1_000_000,
        ) {
            prop_assume!(a != b);
            let when = at(2024, 6, 1);
            prop_assert_ne!(
                ticket_number(a, TicketType::IncidentReport, when),
                ticket_number(b, TicketType::IncidentReport, when)
            );
        }
    }
}
