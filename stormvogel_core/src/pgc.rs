//! Program graphs: models described by locations, typed variables and guarded transitions.
//!
//! A [`ProgramGraphBuilder`] collects the definition of a program graph,
//! and [`ProgramGraphBuilder::build`] unfolds it into a [`Model`]
//! whose states are pairs of a location and a valuation of the variables.

use crate::{
    Model, ModelType, Val, Value,
    bird::{Bird, BuildError},
};
use log::info;
use smallvec::SmallVec;
use std::{
    cell::RefCell,
    collections::BTreeMap,
    fmt,
};
use thiserror::Error;

type VarIdx = u16;
type LocationIdx = u16;
type ActionIdx = u16;

/// A variable of a program graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Var(VarIdx);

/// A location of a program graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location(LocationIdx);

/// An action of a program graph, possibly with effects on the variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Action(ActionIdx);

/// The autonomous action: it has no labels and no effects.
pub const EPSILON: Action = Action(ActionIdx::MAX);

/// The effect of an action on a variable,
/// computing its new value from the current valuation of all variables.
pub type Effect = Box<dyn Fn(&[Val]) -> Val>;

/// A guard enabling a transition under the current valuation of all variables.
pub type Guard = Box<dyn Fn(&[Val]) -> bool>;

/// The error type for defining and building program graphs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PgError {
    /// There is no such variable.
    #[error("variable {0:?} does not exist")]
    MissingVar(Var),
    /// There is no such action.
    #[error("action {0:?} does not exist")]
    MissingAction(Action),
    /// There is no such location.
    #[error("location {0:?} does not exist")]
    MissingLocation(Location),
    /// The name is already in use.
    #[error("name `{0}` is already in use")]
    DuplicateName(String),
    /// The program graph has no locations.
    #[error("the program graph has no locations")]
    NoLocations,
    /// The effect computes a value of the wrong type.
    #[error("effect assigns a value of the wrong type to variable `{0}`")]
    TypeMismatch(String),
    /// The autonomous action cannot have effects.
    #[error("the autonomous action cannot have effects")]
    NoEffects,
    /// Too many transitions are enabled to be represented in the model.
    #[error("location `{0}` has conflicting enabled transitions")]
    Nondeterminism(String),
    /// Unfolding the program graph failed.
    #[error("failed building the model")]
    Build(#[from] BuildError),
}

struct Transition {
    action: Action,
    guard: Option<Guard>,
    post: SmallVec<[(Value, Location); 2]>,
}

struct LocationData {
    name: String,
    transitions: Vec<Transition>,
}

struct ActionData {
    labels: Vec<String>,
    effects: Vec<(Var, Effect)>,
}

/// A state of the unfolded program graph: the current location and variable valuation.
#[derive(Clone, PartialEq, Eq, Hash)]
struct PgState {
    location: Location,
    vars: Vec<Val>,
}

impl fmt::Debug for PgState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let vars = self
            .vars
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        write!(f, "({}, [{}])", self.location.0, vars.join(", "))
    }
}

/// Defines and builds a program graph.
///
/// The first location created is the initial one,
/// unless set otherwise with [`ProgramGraphBuilder::set_initial_location`].
///
/// ```
/// # use stormvogel_core::{pgc::{ProgramGraphBuilder, EPSILON}, ModelType, Val, Value};
/// let mut pg = ProgramGraphBuilder::new();
/// let tries = pg.new_var("tries", Val::Integer(0)).expect("new variable");
/// let flip = pg.new_location("flip").expect("new location");
/// let done = pg.new_location("done").expect("new location");
/// let retry = pg.new_action(["retry"]);
/// pg.add_effect(retry, tries, |vars| match vars[0] {
///     Val::Integer(n) => Val::Integer(n + 1),
///     val => val,
/// })
/// .expect("effect is well-typed");
/// pg.add_probabilistic_transition(
///     flip,
///     retry,
///     vec![(Value::ratio(1, 2), flip), (Value::ratio(1, 2), done)],
///     Some(Box::new(|vars: &[Val]| vars[0] == Val::Integer(0))),
/// )
/// .expect("transition can be added");
/// pg.add_transition(flip, EPSILON, done, Some(Box::new(|vars: &[Val]| vars[0] != Val::Integer(0))))
///     .expect("transition can be added");
/// let model = pg.build(ModelType::Dtmc).expect("build model");
/// // (flip, 0), (flip, 1) and (done, 1)
/// assert_eq!(model.nr_states(), 3);
/// assert!(model.is_stochastic(0.));
/// ```
#[derive(Default)]
pub struct ProgramGraphBuilder {
    vars: Vec<(String, Val)>,
    locations: Vec<LocationData>,
    actions: Vec<ActionData>,
    initial: Option<Location>,
    max_size: Option<usize>,
}

impl fmt::Debug for ProgramGraphBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgramGraphBuilder")
            .field("vars", &self.vars)
            .field(
                "locations",
                &self.locations.iter().map(|l| &l.name).collect::<Vec<_>>(),
            )
            .field(
                "actions",
                &self.actions.iter().map(|a| &a.labels).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ProgramGraphBuilder {
    /// Creates a new [`ProgramGraphBuilder`] with no variables, locations or actions.
    pub fn new() -> Self {
        Self::default()
    }

    fn name_in_use(&self, name: &str) -> bool {
        self.vars.iter().any(|(var, _)| var == name)
            || self.locations.iter().any(|loc| loc.name == name)
    }

    /// Adds a new variable with the given name and initial value.
    ///
    /// Fails if the name is already in use.
    pub fn new_var(&mut self, name: &str, init: Val) -> Result<Var, PgError> {
        if self.name_in_use(name) {
            return Err(PgError::DuplicateName(name.to_owned()));
        }
        // Variables are indexed progressively
        let idx = self.vars.len();
        self.vars.push((name.to_owned(), init));
        Ok(Var(idx as VarIdx))
    }

    /// Adds a new location with the given name.
    ///
    /// Fails if the name is already in use.
    pub fn new_location(&mut self, name: &str) -> Result<Location, PgError> {
        if self.name_in_use(name) {
            return Err(PgError::DuplicateName(name.to_owned()));
        }
        let idx = self.locations.len();
        self.locations.push(LocationData {
            name: name.to_owned(),
            transitions: Vec::new(),
        });
        Ok(Location(idx as LocationIdx))
    }

    /// Sets the location the program graph starts from.
    pub fn set_initial_location(&mut self, location: Location) -> Result<(), PgError> {
        self.check_location(location)?;
        self.initial = Some(location);
        Ok(())
    }

    /// Adds a new action with the given labels.
    pub fn new_action<I, S>(&mut self, labels: I) -> Action
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let idx = self.actions.len();
        self.actions.push(ActionData {
            labels: labels.into_iter().map(Into::into).collect(),
            effects: Vec::new(),
        });
        Action(idx as ActionIdx)
    }

    /// Sets the maximum number of states of the unfolded model.
    pub fn max_size(&mut self, max_size: usize) {
        self.max_size = Some(max_size);
    }

    fn check_location(&self, location: Location) -> Result<(), PgError> {
        if (location.0 as usize) < self.locations.len() {
            Ok(())
        } else {
            Err(PgError::MissingLocation(location))
        }
    }

    fn check_action(&self, action: Action) -> Result<(), PgError> {
        if action == EPSILON || (action.0 as usize) < self.actions.len() {
            Ok(())
        } else {
            Err(PgError::MissingAction(action))
        }
    }

    fn initial_vars(&self) -> Vec<Val> {
        self.vars.iter().map(|(_, val)| *val).collect()
    }

    /// Adds an effect to the given action:
    /// whenever the action triggers a transition, the variable is assigned the computed value.
    /// Effects of the same action are applied simultaneously.
    ///
    /// Fails if the computed value, at the initial valuation, has not the type of the variable.
    pub fn add_effect<F>(&mut self, action: Action, var: Var, effect: F) -> Result<(), PgError>
    where
        F: Fn(&[Val]) -> Val + 'static,
    {
        if action == EPSILON {
            return Err(PgError::NoEffects);
        }
        let (name, init) = self
            .vars
            .get(var.0 as usize)
            .ok_or(PgError::MissingVar(var))?;
        if effect(&self.initial_vars()).r#type() != init.r#type() {
            return Err(PgError::TypeMismatch(name.clone()));
        }
        self.actions
            .get_mut(action.0 as usize)
            .ok_or(PgError::MissingAction(action))?
            .effects
            .push((var, Box::new(effect)));
        Ok(())
    }

    /// Adds a transition with a single post-location.
    #[inline(always)]
    pub fn add_transition(
        &mut self,
        pre: Location,
        action: Action,
        post: Location,
        guard: Option<Guard>,
    ) -> Result<(), PgError> {
        self.add_probabilistic_transition(pre, action, vec![(Value::one(), post)], guard)
    }

    /// Adds a transition leading to the post-locations with the given probabilities (or rates).
    pub fn add_probabilistic_transition(
        &mut self,
        pre: Location,
        action: Action,
        post: Vec<(Value, Location)>,
        guard: Option<Guard>,
    ) -> Result<(), PgError> {
        self.check_location(pre)?;
        self.check_action(action)?;
        post.iter()
            .try_for_each(|(_, location)| self.check_location(*location))?;
        self.locations[pre.0 as usize].transitions.push(Transition {
            action,
            guard,
            post: SmallVec::from_vec(post),
        });
        Ok(())
    }

    fn labels(&self, action: Action) -> &[String] {
        if action == EPSILON {
            &[]
        } else {
            &self.actions[action.0 as usize].labels
        }
    }

    fn enabled<'a>(&'a self, state: &'a PgState) -> impl Iterator<Item = &'a Transition> + 'a {
        self.locations[state.location.0 as usize]
            .transitions
            .iter()
            .filter(|t| t.guard.as_ref().is_none_or(|guard| guard(&state.vars)))
    }

    fn apply(&self, action: Action, vars: &[Val]) -> Result<Vec<Val>, PgError> {
        let mut next = vars.to_vec();
        if action != EPSILON {
            for (var, effect) in &self.actions[action.0 as usize].effects {
                let val = effect(vars);
                let (name, init) = &self.vars[var.0 as usize];
                if val.r#type() != init.r#type() {
                    return Err(PgError::TypeMismatch(name.clone()));
                }
                next[var.0 as usize] = val;
            }
        }
        Ok(next)
    }

    fn successors(
        &self,
        state: &PgState,
        transition: &Transition,
    ) -> Result<Vec<(Value, PgState)>, PgError> {
        let vars = self.apply(transition.action, &state.vars)?;
        Ok(transition
            .post
            .iter()
            .map(|(value, location)| {
                (
                    value.clone(),
                    PgState {
                        location: *location,
                        vars: vars.clone(),
                    },
                )
            })
            .collect())
    }

    /// Unfolds the program graph into a model of the given kind.
    ///
    /// States are labelled with the name of their location and valued with the variables.
    /// Fails if more than one transition is enabled in a state of a kind without actions,
    /// or if two enabled transitions share an action.
    pub fn build(&self, kind: ModelType) -> Result<Model, PgError> {
        let initial = self
            .initial
            .or_else(|| (!self.locations.is_empty()).then_some(Location(0)))
            .ok_or(PgError::NoLocations)?;
        info!(target: "build", "unfolding program graph");
        let error = RefCell::new(None);
        let fail = |err: PgError| -> Option<Vec<(Value, PgState)>> {
            error.borrow_mut().get_or_insert(err);
            None
        };
        let init = PgState {
            location: initial,
            vars: self.initial_vars(),
        };
        let mut bird = Bird::new(kind, init)
            .labels(|state: &PgState| vec![self.locations[state.location.0 as usize].name.clone()])
            .valuations(|state: &PgState| {
                self.vars
                    .iter()
                    .zip(&state.vars)
                    .map(|((name, _), val)| (name.clone(), *val))
                    .collect::<BTreeMap<_, _>>()
            });
        if let Some(max_size) = self.max_size {
            bird = bird.max_size(max_size);
        }
        let bird = if kind.supports_actions() {
            bird.available_actions(|state: &PgState| {
                let mut actions: Vec<Vec<String>> = Vec::new();
                for transition in self.enabled(state) {
                    let labels = self.labels(transition.action).to_vec();
                    if actions.contains(&labels) {
                        fail(PgError::Nondeterminism(
                            self.locations[state.location.0 as usize].name.clone(),
                        ));
                        return Vec::new();
                    }
                    actions.push(labels);
                }
                actions
            })
            .action_delta(|state: &PgState, labels: &[String]| {
                let transition = self
                    .enabled(state)
                    .find(|t| self.labels(t.action) == labels)?;
                self.successors(state, transition).map_or_else(fail, Some)
            })
        } else {
            bird.delta(|state: &PgState| {
                let mut enabled = self.enabled(state);
                let transition = enabled.next()?;
                if enabled.next().is_some() {
                    return fail(PgError::Nondeterminism(
                        self.locations[state.location.0 as usize].name.clone(),
                    ));
                }
                self.successors(state, transition).map_or_else(fail, Some)
            })
        };
        let model = bird.build();
        drop(bird);
        if let Some(err) = error.into_inner() {
            return Err(err);
        }
        Ok(model?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effects_on_epsilon() {
        let mut pg = ProgramGraphBuilder::new();
        let var = pg.new_var("x", Val::Boolean(false)).unwrap();
        assert_eq!(
            pg.add_effect(EPSILON, var, |_| Val::Boolean(true)),
            Err(PgError::NoEffects)
        );
    }

    #[test]
    fn effect_type_mismatch() {
        let mut pg = ProgramGraphBuilder::new();
        let var = pg.new_var("x", Val::Boolean(false)).unwrap();
        let action = pg.new_action(["a"]);
        assert_eq!(
            pg.add_effect(action, var, |_| Val::Integer(1)),
            Err(PgError::TypeMismatch(String::from("x")))
        );
        pg.add_effect(action, var, |_| Val::Boolean(true)).unwrap();
    }

    #[test]
    fn duplicate_names() {
        let mut pg = ProgramGraphBuilder::new();
        pg.new_var("x", Val::Integer(0)).unwrap();
        assert_eq!(
            pg.new_location("x"),
            Err(PgError::DuplicateName(String::from("x")))
        );
    }

    #[test]
    fn missing_location() {
        let mut pg = ProgramGraphBuilder::new();
        let mut other = ProgramGraphBuilder::new();
        let loc = pg.new_location("l").unwrap();
        other.new_location("m").unwrap();
        let far = other.new_location("n").unwrap();
        assert_eq!(
            pg.add_transition(loc, EPSILON, far, None),
            Err(PgError::MissingLocation(far))
        );
    }

    #[test]
    fn nondeterminism_in_dtmc() {
        let mut pg = ProgramGraphBuilder::new();
        let l = pg.new_location("l").unwrap();
        let m = pg.new_location("m").unwrap();
        pg.add_transition(l, EPSILON, m, None).unwrap();
        pg.add_transition(l, EPSILON, l, None).unwrap();
        assert_eq!(
            pg.build(ModelType::Dtmc),
            Err(PgError::Nondeterminism(String::from("l")))
        );
    }

    #[test]
    fn counter_mdp() {
        let mut pg = ProgramGraphBuilder::new();
        let x = pg.new_var("x", Val::Integer(0)).unwrap();
        let l = pg.new_location("l").unwrap();
        let inc = pg.new_action(["inc"]);
        let reset = pg.new_action(["reset"]);
        pg.add_effect(inc, x, |vars| match vars[0] {
            Val::Integer(n) => Val::Integer(n + 1),
            val => val,
        })
        .unwrap();
        pg.add_effect(reset, x, |_| Val::Integer(0)).unwrap();
        pg.add_transition(l, inc, l, Some(Box::new(|vars: &[Val]| vars[0] != Val::Integer(3))))
            .unwrap();
        pg.add_transition(l, reset, l, None).unwrap();
        let model = pg.build(ModelType::Mdp).unwrap();
        assert_eq!(model.nr_states(), 4);
        assert_eq!(model.get_states_with_label("l").len(), 4);
        let init = model.get_initial_state().unwrap();
        assert_eq!(model.get_choice(init).unwrap().len(), 2);
        let top = model
            .get_states()
            .find(|s| s.valuations().get("x") == Some(&Val::Integer(3)))
            .unwrap();
        assert_eq!(model.get_choice(top.id()).unwrap().len(), 1);
    }
}
