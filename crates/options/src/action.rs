//! The closed set of things a policy can choose.
//!
//! A policy over a semi-MDP picks either a primitive action or a
//! temporally extended option. Primitives executed on behalf of an option
//! can be recorded as annotated primitives, which remember the owning option
//! and the sub-step index but otherwise behave exactly like the primitive.

use std::fmt;
use std::sync::Arc;

use semimdp_core::Action;

use crate::option::TemporalOption;

/// A shared, type-erased option.
pub type SharedOption<S, A> = Arc<dyn TemporalOption<S, A>>;

/// A primitive action tagged with the option that executed it.
///
/// Equality, execution and everything else delegate to the wrapped
/// primitive; only [`name`](AnnotatedAction::name) exposes the annotation.
#[derive(Debug, Clone)]
pub struct AnnotatedAction<A> {
    /// Name of the option that selected the primitive.
    pub option: String,
    /// Index of the primitive within that option's execution.
    pub step: usize,
    /// The primitive that was executed.
    pub action: A,
}

impl<A> AnnotatedAction<A> {
    /// Annotate `action` as step `step` of `option`.
    pub fn new(option: impl Into<String>, step: usize, action: A) -> Self {
        Self {
            option: option.into(),
            step,
            action,
        }
    }
}

impl<A: Action> AnnotatedAction<A> {
    /// `option(step)-primitive`, e.g. `toDoor(2)-north`.
    pub fn name(&self) -> String {
        format!("{}({})-{}", self.option, self.step, self.action.name())
    }
}

impl<A: PartialEq> PartialEq for AnnotatedAction<A> {
    fn eq(&self, other: &Self) -> bool {
        self.action == other.action
    }
}

/// An action as seen by a semi-MDP policy.
pub enum ActionKind<S, A> {
    /// A one-step action.
    Primitive(A),
    /// A temporally extended action.
    Option(SharedOption<S, A>),
    /// A primitive recorded on behalf of an option.
    Annotated(AnnotatedAction<A>),
}

impl<S, A> ActionKind<S, A> {
    /// Wrap a concrete option.
    pub fn option<O>(option: O) -> Self
    where
        O: TemporalOption<S, A> + 'static,
    {
        ActionKind::Option(Arc::new(option))
    }

    /// True for primitives, annotated or not.
    pub fn is_primitive(&self) -> bool {
        !matches!(self, ActionKind::Option(_))
    }

    /// The primitive that executes, if this is not an option.
    pub fn primitive(&self) -> Option<&A> {
        match self {
            ActionKind::Primitive(a) => Some(a),
            ActionKind::Annotated(annotated) => Some(&annotated.action),
            ActionKind::Option(_) => None,
        }
    }

    /// The option, if this is one.
    pub fn as_option(&self) -> Option<&SharedOption<S, A>> {
        match self {
            ActionKind::Option(o) => Some(o),
            _ => None,
        }
    }

    /// Strip an annotation, leaving primitives and options unchanged.
    pub fn into_unannotated(self) -> Self {
        match self {
            ActionKind::Annotated(annotated) => ActionKind::Primitive(annotated.action),
            other => other,
        }
    }
}

impl<S, A: Action> ActionKind<S, A> {
    /// Display name: the primitive's name, the option's name, or the
    /// annotated form.
    pub fn name(&self) -> String {
        match self {
            ActionKind::Primitive(a) => a.name(),
            ActionKind::Option(o) => o.name().to_string(),
            ActionKind::Annotated(annotated) => annotated.name(),
        }
    }
}

impl<S, A> From<A> for ActionKind<S, A> {
    fn from(action: A) -> Self {
        ActionKind::Primitive(action)
    }
}

impl<S, A: Clone> Clone for ActionKind<S, A> {
    fn clone(&self) -> Self {
        match self {
            ActionKind::Primitive(a) => ActionKind::Primitive(a.clone()),
            ActionKind::Option(o) => ActionKind::Option(Arc::clone(o)),
            ActionKind::Annotated(annotated) => ActionKind::Annotated(annotated.clone()),
        }
    }
}

/// Primitives compare by the executed action whether or not they are
/// annotated; options compare by name.
impl<S, A: PartialEq> PartialEq for ActionKind<S, A> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ActionKind::Option(a), ActionKind::Option(b)) => a.name() == b.name(),
            (ActionKind::Option(_), _) | (_, ActionKind::Option(_)) => false,
            _ => self.primitive() == other.primitive(),
        }
    }
}

impl<S, A: fmt::Debug> fmt::Debug for ActionKind<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Primitive(a) => f.debug_tuple("Primitive").field(a).finish(),
            ActionKind::Option(o) => f.debug_tuple("Option").field(&o.name()).finish(),
            ActionKind::Annotated(annotated) => f
                .debug_struct("Annotated")
                .field("option", &annotated.option)
                .field("step", &annotated.step)
                .field("action", &annotated.action)
                .finish(),
        }
    }
}

impl<S, A: Action> Action for ActionKind<S, A> {
    fn name(&self) -> String {
        ActionKind::name(self)
    }
}
