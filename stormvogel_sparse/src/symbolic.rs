//! Symbolic algebra of the sparse representation:
//! sparse monomials over a pool of parameters indexed by position.

use crate::MappingError;
use serde::{Deserialize, Serialize};
use stormvogel_core::{Polynomial, RationalFunction};

/// The parameters of a model, indexed by position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariablePool(Vec<String>);

impl VariablePool {
    /// Creates a pool from parameter names.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    /// Index of a parameter, added to the pool if missing.
    pub fn get_or_insert(&mut self, name: &str) -> usize {
        if let Some(idx) = self.index(name) {
            idx
        } else {
            self.0.push(name.to_owned());
            self.0.len() - 1
        }
    }

    /// Index of a parameter.
    pub fn index(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|var| var == name)
    }

    /// Name of the parameter at the given index.
    pub fn name(&self, idx: usize) -> Option<&str> {
        self.0.get(idx).map(String::as_str)
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Tells whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over parameter names, in index order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// A coefficient times a product of powers of parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Monomial {
    /// The coefficient.
    pub coefficient: f64,
    /// `(parameter index, exponent)` pairs, with non-zero exponents only.
    pub powers: Vec<(usize, u32)>,
}

/// A sum of [`Monomial`]s.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymbolicPolynomial(pub Vec<Monomial>);

impl SymbolicPolynomial {
    /// The constant polynomial.
    pub fn constant(value: f64) -> Self {
        if value == 0. {
            Self::default()
        } else {
            Self(vec![Monomial {
                coefficient: value,
                powers: Vec::new(),
            }])
        }
    }

    /// Translates a [`Polynomial`], adding its variables to the pool.
    pub fn from_polynomial(polynomial: &Polynomial, pool: &mut VariablePool) -> Self {
        Self(
            polynomial
                .named_terms()
                .map(|(monomial, coefficient)| {
                    let mut powers = monomial
                        .into_iter()
                        .map(|(var, exp)| (pool.get_or_insert(var), exp))
                        .collect::<Vec<_>>();
                    powers.sort_unstable();
                    Monomial {
                        coefficient,
                        powers,
                    }
                })
                .collect(),
        )
    }

    /// Translates back into a [`Polynomial`] over the variables it uses.
    pub fn to_polynomial(&self, pool: &VariablePool) -> Result<Polynomial, MappingError> {
        let terms = self
            .0
            .iter()
            .map(|monomial| {
                monomial
                    .powers
                    .iter()
                    .map(|(idx, exp)| {
                        pool.name(*idx)
                            .map(|name| (name.to_owned(), *exp))
                            .ok_or(MappingError::UnknownParameter(*idx))
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(|powers| (powers, monomial.coefficient))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Polynomial::from_named_terms(terms))
    }

    fn is_one(&self) -> bool {
        matches!(self.0.as_slice(), [Monomial { coefficient, powers }] if *coefficient == 1. && powers.is_empty())
    }
}

/// A fraction of [`SymbolicPolynomial`]s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolicRationalFunction {
    /// The numerator.
    pub numerator: SymbolicPolynomial,
    /// The denominator.
    pub denominator: SymbolicPolynomial,
}

impl SymbolicRationalFunction {
    /// The constant rational function.
    pub fn constant(value: f64) -> Self {
        Self {
            numerator: SymbolicPolynomial::constant(value),
            denominator: SymbolicPolynomial::constant(1.),
        }
    }

    /// Translates a [`Polynomial`] as a fraction with denominator one.
    pub fn from_polynomial(polynomial: &Polynomial, pool: &mut VariablePool) -> Self {
        Self {
            numerator: SymbolicPolynomial::from_polynomial(polynomial, pool),
            denominator: SymbolicPolynomial::constant(1.),
        }
    }

    /// Translates a [`RationalFunction`].
    pub fn from_rational_function(rf: &RationalFunction, pool: &mut VariablePool) -> Self {
        Self {
            numerator: SymbolicPolynomial::from_polynomial(rf.numerator(), pool),
            denominator: SymbolicPolynomial::from_polynomial(rf.denominator(), pool),
        }
    }

    /// Tells whether the denominator is the constant one,
    /// i.e., whether the function is a polynomial.
    pub fn is_polynomial(&self) -> bool {
        self.denominator.is_one()
    }

    /// Translates back into a [`RationalFunction`].
    ///
    /// Fails on an identically zero denominator.
    pub fn to_rational_function(&self, pool: &VariablePool) -> Result<RationalFunction, MappingError> {
        Ok(RationalFunction::new(
            self.numerator.to_polynomial(pool)?,
            self.denominator.to_polynomial(pool)?,
        )?)
    }
}
