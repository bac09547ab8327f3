//! Registry of bean descriptors, indexed by the raw part of every type a bean can be requested
//! as. Candidates are then narrowed with [resolve], so parameterized types are compared
//! structurally.

use crate::bean::{BeanPtr, NullBean};
use crate::bean_type::{resolve, BeanType, CastFunction, Supertype};
use crate::scope::DEFAULT;
use derivative::Derivative;
use fxhash::FxHashMap;
use itertools::Itertools;
use std::any::TypeId;
use std::sync::Arc;

/// A bean selected for a lookup, together with the cast needed to view its value as the
/// requested type.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct Candidate {
    #[derivative(Debug = "ignore")]
    pub bean: BeanPtr,
    pub scope: &'static str,
    pub priority: i32,
    #[derivative(Debug = "ignore")]
    pub cast: Option<CastFunction>,
}

#[derive(Clone)]
struct RegisteredBean {
    bean: BeanPtr,
    exposed_type: BeanType,
    supertypes: Vec<Supertype>,
    // queried once - every later lookup routes through this scope
    scope: &'static str,
    priority: i32,
}

/// Holds all registered bean descriptors. Populated before the container starts and read-only
/// afterwards.
#[derive(Clone, Default)]
pub struct BeanRegistry {
    beans: Vec<RegisteredBean>,
    by_raw_type: FxHashMap<TypeId, Vec<usize>>,
}

impl BeanRegistry {
    pub fn register(&mut self, bean: BeanPtr) {
        let registered = RegisteredBean {
            exposed_type: bean.exposed_type(),
            supertypes: bean.supertypes(),
            scope: bean.scope(),
            priority: bean.priority(),
            bean,
        };

        let index = self.beans.len();
        for raw in std::iter::once(registered.exposed_type.raw())
            .chain(
                registered
                    .supertypes
                    .iter()
                    .map(|supertype| supertype.bean_type.raw()),
            )
            .unique()
        {
            self.by_raw_type.entry(raw.id).or_default().push(index);
        }

        self.beans.push(registered);
    }

    pub fn register_all<I: IntoIterator<Item = BeanPtr>>(&mut self, beans: I) {
        for bean in beans {
            self.register(bean);
        }
    }

    /// Returns all beans matching given type, sorted by ascending priority. Beans with equal
    /// priorities keep their registration order.
    pub fn lookups(&self, requested: &BeanType) -> Vec<Candidate> {
        self.by_raw_type
            .get(&requested.raw().id)
            .map(|indices| {
                indices
                    .iter()
                    .filter_map(|index| self.beans.get(*index))
                    .filter_map(|registered| {
                        resolve(
                            requested,
                            &registered.exposed_type,
                            &registered.supertypes,
                        )
                        .map(|matched| Candidate {
                            bean: registered.bean.clone(),
                            scope: registered.scope,
                            priority: registered.priority,
                            cast: matched.cast(),
                        })
                    })
                    .sorted_by_key(|candidate| candidate.priority)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns the best matching bean - the one with the lowest priority. When nothing matches,
    /// a [NullBean] is returned instead.
    pub fn lookup(&self, requested: &BeanType) -> Candidate {
        self.lookups(requested)
            .into_iter()
            .next()
            .unwrap_or_else(|| Candidate {
                bean: Arc::new(NullBean::new(requested.clone())),
                scope: DEFAULT,
                priority: i32::MAX,
                cast: None,
            })
    }

    #[inline]
    pub fn contains(&self, requested: &BeanType) -> bool {
        !self.lookups(requested).is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.beans.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.beans.is_empty()
    }
}
