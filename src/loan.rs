use serde::{Deserialize, Serialize};

use crate::error::{DetoxError, Result};
use crate::types::LoanId;

/// The economic terms of a loan without its portfolio identity.
/// A freshly proposed loan is just a set of terms until it is accepted into a slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoanTerms {
    /// Probability-weighted loss fraction.
    pub expected_loss: f64,
    /// Credit spread charged, as a fraction.
    pub spread: f64,
    /// Size relative to the nominal maximum of 1 bln (1.0 = 1 bln).
    pub exposure: f64,
}

impl LoanTerms {
    /// Spread earned net of expected loss, per unit of exposure.
    pub fn margin(&self) -> f64 {
        self.spread - self.expected_loss
    }

    /// Expected loss scaled by exposure: the loan's contribution to concentration.
    pub fn weighted_loss(&self) -> f64 {
        self.expected_loss * self.exposure
    }
}

/// A loan held in a portfolio slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub index: LoanId,
    #[serde(flatten)]
    pub terms: LoanTerms,
}

impl Loan {
    pub fn new(index: LoanId, terms: LoanTerms) -> Self {
        Loan { index, terms }
    }

    pub fn expected_loss(&self) -> f64 {
        self.terms.expected_loss
    }

    pub fn spread(&self) -> f64 {
        self.terms.spread
    }

    pub fn exposure(&self) -> f64 {
        self.terms.exposure
    }
}

/// Fixed-size book of loans where `loans[i].index == LoanId(i)`.
///
/// Size never changes after construction; accepting a proposal overwrites the
/// terms of an existing slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Portfolio {
    loans: Vec<Loan>,
}

impl Portfolio {
    /// Build a portfolio from loans in any order.
    ///
    /// Indices must be exactly `0..n` with no gaps or duplicates, and `n >= 1`.
    pub fn from_loans(mut loans: Vec<Loan>) -> Result<Self> {
        if loans.is_empty() {
            return Err(DetoxError::InvalidConfiguration(
                "portfolio must hold at least one loan".to_string(),
            ));
        }
        loans.sort_by_key(|l| l.index);
        for (pos, loan) in loans.iter().enumerate() {
            if loan.index != LoanId(pos) {
                return Err(DetoxError::InvalidConfiguration(format!(
                    "loan indices must be 0..{}; found {} at position {pos}",
                    loans.len(),
                    loan.index
                )));
            }
        }
        Ok(Portfolio { loans })
    }

    /// Build from terms, assigning indices in order.
    pub fn from_terms(terms: impl IntoIterator<Item = LoanTerms>) -> Result<Self> {
        let loans = terms
            .into_iter()
            .enumerate()
            .map(|(i, t)| Loan::new(LoanId(i), t))
            .collect();
        Self::from_loans(loans)
    }

    pub fn len(&self) -> usize {
        self.loans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loans.is_empty()
    }

    pub fn loans(&self) -> &[Loan] {
        &self.loans
    }

    pub fn get(&self, slot: LoanId) -> Result<&Loan> {
        self.loans
            .get(slot.0)
            .ok_or(DetoxError::LoanNotFound { slot, size: self.loans.len() })
    }

    /// Overwrite the terms held in `slot`, returning the terms it replaced.
    pub fn replace(&mut self, slot: LoanId, terms: LoanTerms) -> Result<LoanTerms> {
        let size = self.loans.len();
        let loan = self.loans.get_mut(slot.0).ok_or(DetoxError::LoanNotFound { slot, size })?;
        Ok(std::mem::replace(&mut loan.terms, terms))
    }

    /// Loans ordered by exposure, largest first. Ties keep index order.
    pub fn largest_exposures(&self, n: usize) -> Vec<&Loan> {
        let mut ranked: Vec<&Loan> = self.loans.iter().collect();
        ranked.sort_by(|a, b| {
            b.exposure()
                .partial_cmp(&a.exposure())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.truncate(n);
        ranked
    }
}
