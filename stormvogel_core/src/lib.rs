//! Explicit-state representation of Markov models
//! (DTMCs, MDPs, CTMCs, POMDPs and Markov automata),
//! with builders, schedulers and a random simulator.
//!
//! A [`Model`] is built either by hand, state by state,
//! or by exploring the state space of a user-defined system with [`bird::Bird`]
//! or of a program graph with [`pgc::ProgramGraphBuilder`].

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod bird;
mod model;
pub mod parametric;
pub mod pgc;
mod scheduler;
pub mod simulator;
mod value;

pub use model::{
    Action, Branch, Choice, EMPTY_ACTION, INIT_LABEL, Model, ModelError, ModelStamp, ModelType,
    Observation, RewardModel, State, StateId,
};
pub use parametric::{Assignment, ParametricError, Polynomial, RationalFunction};
pub use scheduler::{Scheduler, SchedulerError};
pub use value::{Interval, Type, Val, Value, ValueError};
