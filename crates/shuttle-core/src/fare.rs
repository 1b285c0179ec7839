//! Fare rate cache.
//!
//! Built once per session from the route's added rate and the fare-rate table,
//! then used read-only for every fare computation in that session.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::types::{PassengerType, ScanLogEntry};

/// Errors raised while building or querying the fare cache.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FareError {
    #[error("unknown passenger type: {0}")]
    UnknownPassengerType(String),

    #[error("negative rate for {0}")]
    NegativeRate(String),

    #[error("duplicate passenger type: {0}")]
    DuplicatePassengerType(String),

    #[error("fare-rate table is empty")]
    EmptyRateTable,
}

/// Immutable fare lookup for one session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FareRateCache {
    added_rate: Decimal,
    rates: Vec<PassengerType>,
}

impl FareRateCache {
    /// Build the cache, rejecting negative rates and duplicate labels.
    pub fn new(added_rate: Decimal, rates: Vec<PassengerType>) -> Result<Self, FareError> {
        if added_rate < Decimal::ZERO {
            return Err(FareError::NegativeRate("route added rate".into()));
        }
        if rates.is_empty() {
            return Err(FareError::EmptyRateTable);
        }

        let mut seen = std::collections::HashSet::new();
        for rate in &rates {
            if rate.base_rate < Decimal::ZERO {
                return Err(FareError::NegativeRate(rate.label.clone()));
            }
            if !seen.insert(rate.label.as_str()) {
                return Err(FareError::DuplicatePassengerType(rate.label.clone()));
            }
        }

        Ok(Self { added_rate, rates })
    }

    pub fn added_rate(&self) -> Decimal {
        self.added_rate
    }

    /// Passenger types in the order the backend listed them.
    pub fn passenger_types(&self) -> &[PassengerType] {
        &self.rates
    }

    pub fn base_rate(&self, label: &str) -> Result<Decimal, FareError> {
        self.rates
            .iter()
            .find(|r| r.label == label)
            .map(|r| r.base_rate)
            .ok_or_else(|| FareError::UnknownPassengerType(label.to_string()))
    }

    /// `base_rate(label) + added_rate`.
    pub fn fare_for(&self, label: &str) -> Result<Decimal, FareError> {
        Ok(self.base_rate(label)? + self.added_rate)
    }

    pub fn entry_fare(&self, entry: &ScanLogEntry) -> Result<Decimal, FareError> {
        self.fare_for(&entry.passenger_type)
    }

    /// Sum of fares over a log. Used for both the live total and the submitted total.
    pub fn total<'a, I>(&self, entries: I) -> Result<Decimal, FareError>
    where
        I: IntoIterator<Item = &'a ScanLogEntry>,
    {
        entries
            .into_iter()
            .try_fold(Decimal::ZERO, |acc, e| Ok(acc + self.entry_fare(e)?))
    }

    /// Fare already charged against `tag_id` plus the fare of `label`.
    pub fn accumulated_for_tag<'a, I>(
        &self,
        entries: I,
        tag_id: &str,
        label: &str,
    ) -> Result<Decimal, FareError>
    where
        I: IntoIterator<Item = &'a ScanLogEntry>,
    {
        let prior = self.total(
            entries
                .into_iter()
                .filter(|e| e.tag_id.as_deref() == Some(tag_id)),
        )?;
        Ok(prior + self.fare_for(label)?)
    }

    /// Count of entries per passenger type.
    pub fn passenger_counts<'a, I>(entries: I) -> BTreeMap<String, usize>
    where
        I: IntoIterator<Item = &'a ScanLogEntry>,
    {
        let mut counts = BTreeMap::new();
        for e in entries {
            *counts.entry(e.passenger_type.clone()).or_insert(0) += 1;
        }
        counts
    }
}
