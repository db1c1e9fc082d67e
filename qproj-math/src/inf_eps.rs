//! Optimum values over `ℝ ∪ {+∞} ∪ ℝ + ε`.

use std::fmt;

use num_rational::BigRational;
use num_traits::{Signed, Zero};

/// The result of maximizing a linear objective: either `+∞`, or a
/// rational optimum with an infinitesimal part.
///
/// A negative infinitesimal part means the optimum is an open supremum,
/// approached from below but never attained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfEps {
    finite: bool,
    value: BigRational,
    eps: BigRational,
}

impl InfEps {
    /// A finite, attained optimum.
    pub fn finite(value: BigRational) -> Self {
        Self {
            finite: true,
            value,
            eps: BigRational::zero(),
        }
    }

    /// A finite optimum with an explicit infinitesimal part.
    pub fn finite_with_eps(value: BigRational, eps: BigRational) -> Self {
        Self {
            finite: true,
            value,
            eps,
        }
    }

    /// The unbounded optimum `+∞`.
    pub fn infinite() -> Self {
        Self {
            finite: false,
            value: BigRational::zero(),
            eps: BigRational::zero(),
        }
    }

    /// Whether the optimum is finite.
    pub fn is_finite(&self) -> bool {
        self.finite
    }

    /// The rational part of the optimum (zero when infinite).
    pub fn rational(&self) -> &BigRational {
        &self.value
    }

    /// The infinitesimal part of the optimum.
    pub fn infinitesimal(&self) -> &BigRational {
        &self.eps
    }

    /// Whether the optimum is an open supremum (negative infinitesimal).
    pub fn is_open(&self) -> bool {
        self.finite && self.eps.is_negative()
    }
}

impl fmt::Display for InfEps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.finite {
            return write!(f, "oo");
        }
        if self.eps.is_zero() {
            write!(f, "{}", self.value)
        } else {
            write!(f, "{} + {}*eps", self.value, self.eps)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;

    fn rat(n: i64) -> BigRational {
        BigRational::from_integer(BigInt::from(n))
    }

    #[test]
    fn finite_and_infinite() {
        let v = InfEps::finite(rat(7));
        assert!(v.is_finite());
        assert!(!v.is_open());
        assert_eq!(v.to_string(), "7");

        let inf = InfEps::infinite();
        assert!(!inf.is_finite());
        assert_eq!(inf.to_string(), "oo");
    }

    #[test]
    fn open_supremum() {
        let v = InfEps::finite_with_eps(rat(3), rat(-1));
        assert!(v.is_open());
        assert_eq!(v.to_string(), "3 + -1*eps");
    }
}
