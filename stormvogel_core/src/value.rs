use crate::parametric::{Assignment, ParametricError, Polynomial, RationalFunction};
use num::{
    One, Rational64, ToPrimitive, Zero,
    traits::{CheckedAdd, CheckedDiv},
};
use std::{
    collections::BTreeSet,
    fmt,
    hash::{Hash, Hasher},
};
use thiserror::Error;

/// The error type for building [`Value`]s.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    /// The bounds of an [`Interval`] are in the wrong order.
    #[error("interval lower bound {bottom} exceeds upper bound {top}")]
    InvalidInterval {
        /// Lower bound.
        bottom: f64,
        /// Upper bound.
        top: f64,
    },
}

/// A closed interval of probabilities or rates, for interval Markov models.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Interval {
    bottom: f64,
    top: f64,
}

impl Interval {
    /// Creates the interval `[bottom, top]`.
    pub fn new(bottom: f64, top: f64) -> Result<Self, ValueError> {
        if bottom <= top {
            Ok(Self { bottom, top })
        } else {
            Err(ValueError::InvalidInterval { bottom, top })
        }
    }

    /// Lower bound.
    pub fn bottom(&self) -> f64 {
        self.bottom
    }

    /// Upper bound.
    pub fn top(&self) -> f64 {
        self.top
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.bottom, self.top)
    }
}

/// Magnitude of a transition (probability or rate) or of a reward.
#[derive(Debug, Clone)]
pub enum Value {
    /// Exact rational number.
    Rational(Rational64),
    /// Floating-point number.
    Float(f64),
    /// Interval of values.
    Interval(Interval),
    /// Polynomial over named parameters.
    Polynomial(Polynomial),
    /// Rational function over named parameters.
    RationalFunction(RationalFunction),
}

impl Value {
    /// The exact value `0`.
    pub fn zero() -> Self {
        Value::Rational(Rational64::zero())
    }

    /// The exact value `1`.
    pub fn one() -> Self {
        Value::Rational(Rational64::one())
    }

    /// Exact rational `numer/denom`.
    ///
    /// Panics if `denom` is zero.
    pub fn ratio(numer: i64, denom: i64) -> Self {
        Value::Rational(Rational64::new(numer, denom))
    }

    /// Exact rational `numer/denom`, or `None` if `denom` is zero
    /// or the fraction cannot be represented.
    pub fn checked_ratio(numer: i64, denom: i64) -> Option<Self> {
        if denom == 0 {
            return None;
        }
        let (numer, denom) = if denom < 0 {
            (numer.checked_neg()?, denom.checked_neg()?)
        } else {
            (numer, denom)
        };
        Some(Value::Rational(Rational64::new(numer, denom)))
    }

    /// Returns the value as a float, if it is a number
    /// (or a parametric value that does not depend on any parameter).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Rational(r) => r.to_f64(),
            Value::Float(f) => Some(*f),
            Value::Interval(_) => None,
            Value::Polynomial(p) => p.constant_value(),
            Value::RationalFunction(rf) => rf.constant_value(),
        }
    }

    /// Returns the exact rational, if the value is one.
    pub fn as_rational(&self) -> Option<Rational64> {
        if let Value::Rational(r) = self {
            Some(*r)
        } else {
            None
        }
    }

    /// Tells whether the value is a plain number.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Rational(_) | Value::Float(_))
    }

    /// Tells whether the value is a polynomial or a rational function.
    pub fn is_parametric(&self) -> bool {
        matches!(self, Value::Polynomial(_) | Value::RationalFunction(_))
    }

    /// Tells whether the value is an interval.
    pub fn is_interval(&self) -> bool {
        matches!(self, Value::Interval(_))
    }

    /// Tells whether the value is (numerically) zero.
    pub fn is_zero(&self) -> bool {
        match self {
            Value::Rational(r) => r.is_zero(),
            Value::Float(f) => *f == 0.,
            Value::Interval(i) => i.bottom == 0. && i.top == 0.,
            Value::Polynomial(p) => p.is_zero(),
            Value::RationalFunction(rf) => rf.numerator().is_zero(),
        }
    }

    /// The parameters the value depends on.
    pub fn parameters(&self) -> BTreeSet<String> {
        match self {
            Value::Polynomial(p) => p.used_variables(),
            Value::RationalFunction(rf) => rf.used_variables(),
            _ => BTreeSet::new(),
        }
    }

    /// Substitutes the assigned values for the parameters.
    ///
    /// Parametric values collapse to a [`Value::Float`],
    /// all other values are returned unchanged.
    pub fn valuation(&self, assignment: &Assignment) -> Result<Value, ParametricError> {
        match self {
            Value::Polynomial(p) => p.valuation(assignment).map(Value::Float),
            Value::RationalFunction(rf) => rf.valuation(assignment).map(Value::Float),
            value => Ok(value.clone()),
        }
    }

    /// Sums numeric values, exactly if all of them are rational.
    ///
    /// Returns `None` if any of the values is not numeric.
    pub fn sum<'a, I>(values: I) -> Option<Value>
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let values = values.into_iter().collect::<Vec<_>>();
        if !values.iter().all(|v| v.is_numeric()) {
            return None;
        }
        let exact = values.iter().try_fold(Rational64::zero(), |acc, v| {
            v.as_rational().and_then(|r| acc.checked_add(&r))
        });
        if let Some(exact) = exact {
            Some(Value::Rational(exact))
        } else {
            values
                .iter()
                .map(|v| v.as_f64())
                .sum::<Option<f64>>()
                .map(Value::Float)
        }
    }

    /// Divides a numeric value by another, exactly if both are rational.
    ///
    /// Returns `None` for non-numeric values or a zero divisor.
    pub fn checked_div(&self, divisor: &Value) -> Option<Value> {
        if divisor.is_zero() || !self.is_numeric() || !divisor.is_numeric() {
            return None;
        }
        if let (Value::Rational(num), Value::Rational(den)) = (self, divisor) {
            if let Some(r) = num.checked_div(den) {
                return Some(Value::Rational(r));
            }
        }
        Some(Value::Float(self.as_f64()? / divisor.as_f64()?))
    }

    fn to_rational_function(&self) -> Option<RationalFunction> {
        match self {
            Value::Polynomial(p) => RationalFunction::new(p.clone(), Polynomial::constant(1.)).ok(),
            Value::RationalFunction(rf) => Some(rf.clone()),
            Value::Interval(_) => None,
            value => value.as_f64().and_then(|f| {
                RationalFunction::new(Polynomial::constant(f), Polynomial::constant(1.)).ok()
            }),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Rational(a), Value::Rational(b)) => a == b,
            (Value::Interval(a), Value::Interval(b)) => a == b,
            (Value::Interval(_), _) | (_, Value::Interval(_)) => false,
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a == b,
                (None, None) => self.to_rational_function() == other.to_rational_function(),
                _ => false,
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Rational(r) if r.is_integer() => write!(f, "{}", r.numer()),
            Value::Rational(r) => write!(f, "{}/{}", r.numer(), r.denom()),
            Value::Float(x) => write!(f, "{x}"),
            Value::Interval(i) => write!(f, "{i}"),
            Value::Polynomial(p) => write!(f, "{p}"),
            Value::RationalFunction(rf) => write!(f, "{rf}"),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Rational(Rational64::from_integer(value))
    }
}

impl From<Rational64> for Value {
    fn from(value: Rational64) -> Self {
        Value::Rational(value)
    }
}

impl From<Interval> for Value {
    fn from(value: Interval) -> Self {
        Value::Interval(value)
    }
}

impl From<Polynomial> for Value {
    fn from(value: Polynomial) -> Self {
        Value::Polynomial(value)
    }
}

impl From<RationalFunction> for Value {
    fn from(value: RationalFunction) -> Self {
        Value::RationalFunction(value)
    }
}

/// Types of state variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    /// Boolean type.
    Boolean,
    /// Integer type.
    Integer,
    /// Floating-point type.
    Float,
}

/// Value of a state variable.
#[derive(Debug, Clone, Copy)]
pub enum Val {
    /// Boolean value.
    Boolean(bool),
    /// Integer value.
    Integer(i64),
    /// Floating-point value.
    Float(f64),
}

impl Val {
    /// The type of the value.
    pub fn r#type(&self) -> Type {
        match self {
            Val::Boolean(_) => Type::Boolean,
            Val::Integer(_) => Type::Integer,
            Val::Float(_) => Type::Float,
        }
    }
}

// Floats are compared bitwise, so that valuations can be hashed.
impl PartialEq for Val {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Val::Boolean(a), Val::Boolean(b)) => a == b,
            (Val::Integer(a), Val::Integer(b)) => a == b,
            (Val::Float(a), Val::Float(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }
}

impl Eq for Val {}

impl Hash for Val {
    fn hash<H: Hasher>(&self, state: &mut H) {
        core::mem::discriminant(self).hash(state);
        match self {
            Val::Boolean(b) => b.hash(state),
            Val::Integer(i) => i.hash(state),
            Val::Float(f) => f.to_bits().hash(state),
        }
    }
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Boolean(b) => write!(f, "{b}"),
            Val::Integer(i) => write!(f, "{i}"),
            Val::Float(x) => write!(f, "{x}"),
        }
    }
}

impl From<bool> for Val {
    fn from(value: bool) -> Self {
        Val::Boolean(value)
    }
}

impl From<i64> for Val {
    fn from(value: i64) -> Self {
        Val::Integer(value)
    }
}

impl From<f64> for Val {
    fn from(value: f64) -> Self {
        Val::Float(value)
    }
}
