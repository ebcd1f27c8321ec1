//! Symbolic transition values:
//! polynomials over named variables and rational functions thereof.

use smallvec::SmallVec;
use std::{
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt,
};
use thiserror::Error;

/// Exponent tuple of a term, one exponent per declared variable.
pub type Exponents = SmallVec<[u32; 4]>;

/// A concrete value for each (named) variable.
pub type Assignment = HashMap<String, f64>;

// Monomial keyed by variable names, with only non-zero exponents, sorted by name.
type NamedMonomial = Vec<(String, u32)>;

/// The error type for operations on [`Polynomial`] and [`RationalFunction`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParametricError {
    /// The term's exponent tuple does not match the number of declared variables.
    #[error("term has {found} exponents but the polynomial declares {expected} variables")]
    Arity {
        /// Number of declared variables.
        expected: usize,
        /// Length of the offending exponent tuple.
        found: usize,
    },
    /// A variable used by the value has no assigned value.
    #[error("variable `{0}` is not assigned a value")]
    UnassignedVariable(String),
    /// The denominator of a rational function is the zero polynomial.
    #[error("the denominator of a rational function cannot be identically zero")]
    ZeroDenominator,
    /// The denominator of a rational function evaluates to zero.
    #[error("the denominator evaluates to zero under the given assignment")]
    DivisionByZero,
}

/// A polynomial over an ordered list of named variables.
///
/// Every term is keyed by an exponent tuple with one entry per variable.
///
/// ```
/// # use stormvogel_core::parametric::Polynomial;
/// # use std::collections::HashMap;
/// let mut p = Polynomial::new(["x", "y", "z"]);
/// p.add_term(&[1, 1, 1], 4.0).expect("arity matches");
/// let assignment = HashMap::from([
///     (String::from("x"), 1.0),
///     (String::from("y"), 2.0),
///     (String::from("z"), 3.0),
/// ]);
/// assert_eq!(p.valuation(&assignment), Ok(24.0));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Polynomial {
    variables: Vec<String>,
    terms: BTreeMap<Exponents, f64>,
}

impl Polynomial {
    /// Creates the zero polynomial over the given variables.
    pub fn new<I, S>(variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            variables: variables.into_iter().map(Into::into).collect(),
            terms: BTreeMap::new(),
        }
    }

    /// Creates a constant polynomial (with no variables).
    pub fn constant(value: f64) -> Self {
        let mut poly = Self::default();
        if value != 0. {
            poly.terms.insert(Exponents::new(), value);
        }
        poly
    }

    /// Builds a polynomial from terms given as lists of `(variable, exponent)` pairs.
    ///
    /// The variables of the polynomial are all the variables mentioned by the terms, sorted by name.
    pub fn from_named_terms<I>(terms: I) -> Self
    where
        I: IntoIterator<Item = (Vec<(String, u32)>, f64)>,
    {
        let terms = terms.into_iter().collect::<Vec<_>>();
        let variables = terms
            .iter()
            .flat_map(|(monomial, _)| monomial.iter().map(|(var, _)| var.clone()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();
        let mut poly = Self {
            variables,
            terms: BTreeMap::new(),
        };
        for (monomial, coefficient) in terms {
            let mut exponents = Exponents::from_elem(0, poly.variables.len());
            for (var, exp) in monomial {
                let idx = poly
                    .variables
                    .binary_search(&var)
                    .expect("variables collected from terms");
                exponents[idx] += exp;
            }
            poly.insert(exponents, coefficient);
        }
        poly
    }

    /// Adds a term with the given exponents and coefficient.
    ///
    /// If a term with the same exponents already exists, the coefficients are summed.
    pub fn add_term(&mut self, exponents: &[u32], coefficient: f64) -> Result<(), ParametricError> {
        if exponents.len() != self.variables.len() {
            return Err(ParametricError::Arity {
                expected: self.variables.len(),
                found: exponents.len(),
            });
        }
        self.insert(Exponents::from_slice(exponents), coefficient);
        Ok(())
    }

    fn insert(&mut self, exponents: Exponents, coefficient: f64) {
        let sum = self.terms.get(&exponents).copied().unwrap_or_default() + coefficient;
        if sum == 0. {
            self.terms.remove(&exponents);
        } else {
            self.terms.insert(exponents, sum);
        }
    }

    /// The declared variables, in declaration order.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// The variables that occur with non-zero exponent in some term.
    pub fn used_variables(&self) -> BTreeSet<String> {
        self.terms
            .keys()
            .flat_map(|exps| {
                exps.iter()
                    .zip(&self.variables)
                    .filter(|(e, _)| **e > 0)
                    .map(|(_, var)| var.clone())
            })
            .collect()
    }

    /// Number of declared variables.
    pub fn dimension(&self) -> usize {
        self.variables.len()
    }

    /// Maximum total degree among the terms (0 for constant polynomials).
    pub fn degree(&self) -> u32 {
        self.terms
            .keys()
            .map(|exps| exps.iter().sum::<u32>())
            .max()
            .unwrap_or(0)
    }

    /// Iterates over the terms as (exponents, coefficient) pairs.
    pub fn terms(&self) -> impl Iterator<Item = (&[u32], f64)> {
        self.terms.iter().map(|(exps, c)| (exps.as_slice(), *c))
    }

    /// Iterates over the terms with exponents keyed by variable name,
    /// omitting variables with exponent zero.
    pub fn named_terms(&self) -> impl Iterator<Item = (Vec<(&str, u32)>, f64)> {
        self.terms.iter().map(|(exps, c)| {
            let monomial = exps
                .iter()
                .zip(&self.variables)
                .filter(|(e, _)| **e > 0)
                .map(|(e, var)| (var.as_str(), *e))
                .collect();
            (monomial, *c)
        })
    }

    /// Tells whether the polynomial is identically zero.
    pub fn is_zero(&self) -> bool {
        self.terms.is_empty()
    }

    /// Returns the value of the polynomial if it does not depend on any variable.
    pub fn constant_value(&self) -> Option<f64> {
        if self.terms.keys().all(|exps| exps.iter().all(|e| *e == 0)) {
            Some(self.terms.values().sum())
        } else {
            None
        }
    }

    /// Evaluates the polynomial by substituting the assigned values for its variables.
    ///
    /// Fails if a variable used by some term has no assigned value.
    pub fn valuation(&self, assignment: &Assignment) -> Result<f64, ParametricError> {
        self.terms.iter().try_fold(0., |acc, (exps, c)| {
            let product = exps.iter().zip(&self.variables).filter(|(e, _)| **e > 0).try_fold(
                *c,
                |prod, (e, var)| {
                    assignment
                        .get(var)
                        .map(|val| prod * val.powi(*e as i32))
                        .ok_or_else(|| ParametricError::UnassignedVariable(var.clone()))
                },
            )?;
            Ok(acc + product)
        })
    }

    fn canonical(&self) -> BTreeMap<NamedMonomial, f64> {
        let mut canonical = BTreeMap::new();
        for (monomial, c) in self.named_terms() {
            let mut monomial = monomial
                .into_iter()
                .map(|(var, e)| (var.to_owned(), e))
                .collect::<Vec<_>>();
            monomial.sort();
            *canonical.entry(monomial).or_insert(0.) += c;
        }
        canonical.retain(|_, c| *c != 0.);
        canonical
    }

    /// Multiplies two polynomials.
    pub fn product(&self, other: &Polynomial) -> Polynomial {
        let lhs = self.canonical();
        let rhs = other.canonical();
        let terms = lhs.iter().flat_map(|(m1, c1)| {
            rhs.iter().map(move |(m2, c2)| {
                let mut monomial = m1.clone();
                monomial.extend(m2.iter().cloned());
                (monomial, c1 * c2)
            })
        });
        Polynomial::from_named_terms(terms)
    }
}

impl PartialEq for Polynomial {
    fn eq(&self, other: &Self) -> bool {
        self.canonical() == other.canonical()
    }
}

impl PartialOrd for Polynomial {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        let lhs = self.canonical().into_iter().collect::<Vec<_>>();
        let rhs = other.canonical().into_iter().collect::<Vec<_>>();
        lhs.partial_cmp(&rhs)
    }
}

impl fmt::Display for Polynomial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let canonical = self.canonical();
        if canonical.is_empty() {
            return write!(f, "0");
        }
        for (n, (monomial, c)) in canonical.iter().enumerate() {
            if n > 0 {
                write!(f, " + ")?;
            }
            write!(f, "{c}")?;
            for (var, e) in monomial {
                if *e == 1 {
                    write!(f, "*{var}")?;
                } else {
                    write!(f, "*{var}^{e}")?;
                }
            }
        }
        Ok(())
    }
}

/// A fraction of polynomials, whose denominator is never identically zero.
#[derive(Debug, Clone)]
pub struct RationalFunction {
    numerator: Polynomial,
    denominator: Polynomial,
}

impl RationalFunction {
    /// Creates a new rational function.
    ///
    /// Fails if the denominator is the zero polynomial.
    pub fn new(numerator: Polynomial, denominator: Polynomial) -> Result<Self, ParametricError> {
        if denominator.is_zero() {
            Err(ParametricError::ZeroDenominator)
        } else {
            Ok(Self {
                numerator,
                denominator,
            })
        }
    }

    /// The numerator polynomial.
    pub fn numerator(&self) -> &Polynomial {
        &self.numerator
    }

    /// The denominator polynomial.
    pub fn denominator(&self) -> &Polynomial {
        &self.denominator
    }

    /// Union of the variables of numerator and denominator, sorted by name.
    pub fn variables(&self) -> BTreeSet<String> {
        self.numerator
            .variables()
            .iter()
            .chain(self.denominator.variables())
            .cloned()
            .collect()
    }

    /// The variables occurring in either numerator or denominator.
    pub fn used_variables(&self) -> BTreeSet<String> {
        let mut vars = self.numerator.used_variables();
        vars.extend(self.denominator.used_variables());
        vars
    }

    /// Returns the value of the rational function if it does not depend on any variable.
    pub fn constant_value(&self) -> Option<f64> {
        let num = self.numerator.constant_value()?;
        let den = self.denominator.constant_value()?;
        (den != 0.).then(|| num / den)
    }

    /// Evaluates numerator and denominator and divides them.
    pub fn valuation(&self, assignment: &Assignment) -> Result<f64, ParametricError> {
        let num = self.numerator.valuation(assignment)?;
        let den = self.denominator.valuation(assignment)?;
        if den == 0. {
            Err(ParametricError::DivisionByZero)
        } else {
            Ok(num / den)
        }
    }
}

impl PartialEq for RationalFunction {
    fn eq(&self, other: &Self) -> bool {
        // a/b == c/d iff a*d == c*b
        self.numerator.product(&other.denominator) == other.numerator.product(&self.denominator)
    }
}

impl PartialOrd for RationalFunction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match self.numerator.partial_cmp(&other.numerator)? {
            Ordering::Equal => self.denominator.partial_cmp(&other.denominator),
            ord => Some(ord),
        }
    }
}

impl fmt::Display for RationalFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})/({})", self.numerator, self.denominator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xyz() -> Assignment {
        HashMap::from([
            (String::from("x"), 1.),
            (String::from("y"), 2.),
            (String::from("z"), 3.),
        ])
    }

    #[test]
    fn polynomial_valuation() {
        let mut p = Polynomial::new(["x", "y", "z"]);
        p.add_term(&[1, 1, 1], 4.).unwrap();
        assert_eq!(p.valuation(&xyz()), Ok(24.));
        p.add_term(&[0, 2, 0], 0.5).unwrap();
        assert_eq!(p.valuation(&xyz()), Ok(26.));
        assert_eq!(p.degree(), 3);
    }

    #[test]
    fn arity_mismatch() {
        let mut p = Polynomial::new(["x", "y"]);
        assert_eq!(
            p.add_term(&[1], 1.),
            Err(ParametricError::Arity {
                expected: 2,
                found: 1
            })
        );
    }

    #[test]
    fn missing_variable() {
        let mut p = Polynomial::new(["x", "w"]);
        p.add_term(&[1, 1], 1.).unwrap();
        assert_eq!(
            p.valuation(&xyz()),
            Err(ParametricError::UnassignedVariable(String::from("w")))
        );
    }

    #[test]
    fn terms_cancel_out() {
        let mut p = Polynomial::new(["x"]);
        p.add_term(&[1], 2.).unwrap();
        p.add_term(&[1], -2.).unwrap();
        assert!(p.is_zero());
        assert_eq!(p.to_string(), "0");
    }

    #[test]
    fn equality_ignores_declaration_order() {
        let mut p = Polynomial::new(["x", "y"]);
        p.add_term(&[2, 1], 3.).unwrap();
        let mut q = Polynomial::new(["y", "x", "z"]);
        q.add_term(&[1, 2, 0], 3.).unwrap();
        assert_eq!(p, q);
        assert_eq!(p.to_string(), "3*x^2*y");
    }

    #[test]
    fn rational_function() {
        let mut num = Polynomial::new(["x", "y", "z"]);
        num.add_term(&[1, 1, 1], 4.).unwrap();
        let mut den = Polynomial::new(["x"]);
        den.add_term(&[1], 2.).unwrap();
        den.add_term(&[0], 1.).unwrap();
        let rf = RationalFunction::new(num.clone(), den.clone()).unwrap();
        assert_eq!(
            rf.valuation(&xyz()).unwrap(),
            num.valuation(&xyz()).unwrap() / den.valuation(&xyz()).unwrap()
        );
        assert_eq!(rf.valuation(&xyz()), Ok(8.));
    }

    #[test]
    fn zero_denominator() {
        let num = Polynomial::constant(1.);
        assert_eq!(
            RationalFunction::new(num, Polynomial::new(["x"])).unwrap_err(),
            ParametricError::ZeroDenominator
        );
    }

    #[test]
    fn rational_function_equality() {
        let mut x = Polynomial::new(["x"]);
        x.add_term(&[1], 1.).unwrap();
        let mut two_x = Polynomial::new(["x"]);
        two_x.add_term(&[1], 2.).unwrap();
        let half = RationalFunction::new(x, two_x).unwrap();
        let also_half = RationalFunction::new(Polynomial::constant(1.), Polynomial::constant(2.))
            .unwrap();
        assert_eq!(half, also_half);
        assert_eq!(also_half.constant_value(), Some(0.5));
    }
}
