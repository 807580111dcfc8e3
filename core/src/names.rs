//! Deterministic customer attributes drawn from curated lists.
//!
//! Names, streets, occupations and home countries. All draws go through a
//! StreamRng, so the same seed always yields the same customer.

use crate::rng::StreamRng;

/// A home country and the currency a customer there reports in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Country {
    pub code: &'static str,
    pub currency: &'static str,
    pub cities: &'static [&'static str],
}

pub const COUNTRIES: &[Country] = &[
    Country { code: "US", currency: "USD", cities: &["New York", "Chicago", "Houston", "Phoenix", "Denver", "Seattle"] },
    Country { code: "GB", currency: "GBP", cities: &["London", "Manchester", "Leeds", "Bristol", "Glasgow"] },
    Country { code: "DE", currency: "EUR", cities: &["Berlin", "Hamburg", "Munich", "Cologne", "Frankfurt"] },
    Country { code: "FR", currency: "EUR", cities: &["Paris", "Lyon", "Marseille", "Toulouse", "Nantes"] },
    Country { code: "CA", currency: "CAD", cities: &["Toronto", "Montreal", "Vancouver", "Calgary", "Ottawa"] },
    Country { code: "JP", currency: "JPY", cities: &["Tokyo", "Osaka", "Nagoya", "Sapporo", "Fukuoka"] },
];

/// Domestic customers dominate; the rest are spread over the other countries.
const COUNTRY_WEIGHTS: [f64; 6] = [70.0, 8.0, 6.0, 6.0, 7.0, 3.0];

pub struct NameGenerator;

impl NameGenerator {
    pub fn first_name(rng: &mut StreamRng) -> &'static str {
        *rng.pick(FIRST_NAMES)
    }

    pub fn last_name(rng: &mut StreamRng) -> &'static str {
        *rng.pick(LAST_NAMES)
    }

    pub fn occupation(rng: &mut StreamRng) -> &'static str {
        *rng.pick(OCCUPATIONS)
    }

    /// A different occupation from `current`.
    pub fn next_occupation(rng: &mut StreamRng, current: &str) -> &'static str {
        loop {
            let pick = Self::occupation(rng);
            if pick != current {
                return pick;
            }
        }
    }

    pub fn home_country(rng: &mut StreamRng) -> &'static Country {
        let i = rng.weighted_index(&COUNTRY_WEIGHTS).unwrap_or(0);
        &COUNTRIES[i]
    }

    /// Any country other than `current`.
    pub fn foreign_country(rng: &mut StreamRng, current: &str) -> &'static Country {
        loop {
            let pick = rng.pick(COUNTRIES);
            if pick.code != current {
                return pick;
            }
        }
    }

    pub fn country(code: &str) -> Option<&'static Country> {
        COUNTRIES.iter().find(|c| c.code == code)
    }

    /// "1234 Oak Street" style first line.
    pub fn street_line(rng: &mut StreamRng) -> String {
        let number = rng.range_inclusive(1, 9999);
        format!("{} {} {}", number, rng.pick(STREET_NAMES), rng.pick(STREET_TYPES))
    }

    pub fn postal_code(rng: &mut StreamRng) -> String {
        format!("{:05}", rng.range_inclusive(10_000, 99_999))
    }
}

const FIRST_NAMES: &[&str] = &[
    "James", "Robert", "John", "Michael", "David", "William", "Richard", "Joseph",
    "Thomas", "Charles", "Daniel", "Matthew", "Anthony", "Mark", "Steven", "Paul",
    "Andrew", "Joshua", "Kevin", "Brian", "George", "Edward", "Ryan", "Jacob",
    "Mary", "Patricia", "Jennifer", "Linda", "Elizabeth", "Barbara", "Susan",
    "Jessica", "Sarah", "Karen", "Lisa", "Nancy", "Sandra", "Ashley", "Emily",
    "Michelle", "Amanda", "Melissa", "Stephanie", "Rebecca", "Laura", "Sharon",
    "Kathleen", "Amy", "Angela", "Anna", "Emma", "Olivia", "Sophia", "Grace",
];

const LAST_NAMES: &[&str] = &[
    "Smith", "Johnson", "Williams", "Brown", "Jones", "Garcia", "Miller", "Davis",
    "Rodriguez", "Martinez", "Hernandez", "Lopez", "Gonzalez", "Wilson", "Anderson",
    "Thomas", "Taylor", "Moore", "Jackson", "Martin", "Lee", "Perez", "Thompson",
    "White", "Harris", "Sanchez", "Clark", "Ramirez", "Lewis", "Robinson",
    "Walker", "Young", "Allen", "King", "Wright", "Scott", "Torres", "Nguyen",
    "Hill", "Flores", "Green", "Adams", "Nelson", "Baker", "Hall", "Rivera",
    "Campbell", "Mitchell", "Carter", "Roberts", "Patel", "Chen", "Kim", "Schmidt",
];

const STREET_NAMES: &[&str] = &[
    "Oak", "Maple", "Cedar", "Pine", "Elm", "Main", "Park", "Lake", "Hill",
    "Washington", "Lincoln", "Church", "Mill", "River", "Sunset", "Highland",
];

const STREET_TYPES: &[&str] = &["Street", "Avenue", "Road", "Lane", "Drive", "Court", "Way"];

const OCCUPATIONS: &[&str] = &[
    "Accountant", "Engineer", "Teacher", "Nurse", "Electrician", "Sales Manager",
    "Software Developer", "Pharmacist", "Chef", "Architect", "Consultant",
    "Logistics Coordinator", "Retail Supervisor", "Self-Employed", "Retired",
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::{RngBank, StreamSlot};

    #[test]
    fn names_are_deterministic() {
        let bank = RngBank::new(12345);
        let mut a = bank.for_entity(3, StreamSlot::Registry);
        let mut b = bank.for_entity(3, StreamSlot::Registry);
        assert_eq!(NameGenerator::first_name(&mut a), NameGenerator::first_name(&mut b));
        assert_eq!(NameGenerator::street_line(&mut a), NameGenerator::street_line(&mut b));
    }

    #[test]
    fn foreign_country_differs() {
        let mut rng = RngBank::new(1).for_entity(0, StreamSlot::Address);
        for _ in 0..50 {
            assert_ne!(NameGenerator::foreign_country(&mut rng, "US").code, "US");
        }
    }

    #[test]
    fn every_country_has_cities() {
        assert_eq!(COUNTRIES.len(), COUNTRY_WEIGHTS.len());
        assert!(COUNTRIES.iter().all(|c| !c.cities.is_empty()));
    }
}
