//! Reflection-free type model used to match lookups against registered beans.
//!
//! A [BeanType] is an explicit tagged structure: a raw type and an ordered list of type
//! arguments. Two bean types are compatible only when they are structurally equal, which gives
//! invariant type arguments: `Repository<User>` never matches `Repository<Order>`. Supertype
//! (usually `dyn Trait`) matching is opt-in - a bean declares every [Supertype] it can be viewed
//! as, together with a [CastFunction] converting its value.

use crate::instance::BeanValue;
use derivative::Derivative;
use itertools::Itertools;
use std::any::{type_name, TypeId};
use std::fmt::{Display, Formatter};

/// Converts a type-erased bean value into a value of another (super)type. Returns the original
/// value on failure.
pub type CastFunction = fn(BeanValue) -> Result<BeanValue, BeanValue>;

/// Raw (unparameterized) part of a [BeanType]. Equality is based solely on the [TypeId].
#[derive(Derivative, Clone, Copy)]
#[derivative(Debug, PartialEq, Eq, Hash)]
pub struct RawType {
    pub id: TypeId,
    #[derivative(PartialEq = "ignore", Hash = "ignore")]
    pub name: &'static str,
}

impl RawType {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }
}

/// Semantic type by which beans are exposed and requested.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BeanType {
    raw: RawType,
    arguments: Vec<BeanType>,
}

impl BeanType {
    /// Creates an unparameterized type.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            raw: RawType::of::<T>(),
            arguments: vec![],
        }
    }

    pub fn parameterized(raw: RawType, arguments: Vec<BeanType>) -> Self {
        Self { raw, arguments }
    }

    /// Appends a type argument.
    pub fn with_argument(mut self, argument: BeanType) -> Self {
        self.arguments.push(argument);
        self
    }

    #[inline]
    pub fn raw(&self) -> RawType {
        self.raw
    }

    #[inline]
    pub fn arguments(&self) -> &[BeanType] {
        &self.arguments
    }

    #[inline]
    pub fn is_parameterized(&self) -> bool {
        !self.arguments.is_empty()
    }

    /// Checks if a bean exposing `candidate` satisfies a request for this type.
    pub fn is_assignable_from(&self, candidate: &BeanType) -> bool {
        self.raw == candidate.raw
            && self.arguments.len() == candidate.arguments.len()
            && self
                .arguments
                .iter()
                .zip(&candidate.arguments)
                .all(|(requested, candidate)| requested.is_assignable_from(candidate))
    }
}

impl Display for BeanType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.arguments.is_empty() {
            write!(f, "{}", self.raw.name)
        } else {
            write!(
                f,
                "{}<{}>",
                self.raw.name,
                self.arguments.iter().map(ToString::to_string).join(", ")
            )
        }
    }
}

/// Declares that a bean can be requested as another type.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct Supertype {
    pub bean_type: BeanType,
    #[derivative(Debug = "ignore")]
    pub cast: CastFunction,
}

impl Supertype {
    pub fn new(bean_type: BeanType, cast: CastFunction) -> Self {
        Self { bean_type, cast }
    }
}

/// Result of matching a request against a bean.
#[derive(Derivative, Clone, Copy)]
#[derivative(Debug)]
pub enum TypeMatch {
    /// The bean exposes exactly the requested type.
    Exact,
    /// The bean is assignable through one of its supertypes.
    Supertype(#[derivative(Debug = "ignore")] CastFunction),
}

impl TypeMatch {
    #[inline]
    pub fn cast(&self) -> Option<CastFunction> {
        match self {
            Self::Exact => None,
            Self::Supertype(cast) => Some(*cast),
        }
    }
}

/// Decides whether a bean exposing `exposed` and declaring `supertypes` satisfies `requested`.
pub fn resolve(
    requested: &BeanType,
    exposed: &BeanType,
    supertypes: &[Supertype],
) -> Option<TypeMatch> {
    if requested.is_assignable_from(exposed) {
        return Some(TypeMatch::Exact);
    }

    supertypes
        .iter()
        .find(|supertype| requested.is_assignable_from(&supertype.bean_type))
        .map(|supertype| TypeMatch::Supertype(supertype.cast))
}

/// Creates a [CastFunction] viewing a concrete bean as one of its supertypes, e.g.
/// `upcast!(Greeter => dyn Greeting + Send + Sync)`.
#[macro_export]
macro_rules! upcast {
    ($source:ty => $target:ty) => {
        |value: $crate::instance::BeanValue| -> ::std::result::Result<
            $crate::instance::BeanValue,
            $crate::instance::BeanValue,
        > {
            let source = value
                .downcast_ref::<::std::sync::Arc<$source>>()
                .cloned();
            match source {
                Some(source) => Ok($crate::instance::bean_value(
                    source as ::std::sync::Arc<$target>,
                )),
                None => Err(value),
            }
        }
    };
}
