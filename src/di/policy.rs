//! Conflict policies for competing registrations.
//!
//! # Design Decisions
//! - Distance only breaks ties between implicit (bound) candidates
//! - Explicit versus explicit, and explicit versus implicit, are decided
//!   by the policy alone
//! - An `Ambiguous` outcome is stored and only fails when resolved

use std::fmt;

use crate::di::key::DependencyKey;

/// What the policy sees of an existing or incoming registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitializerKind {
    /// Registered directly for the key.
    Explicit,
    /// A capability of another registration, `distance` steps away.
    Implicit { distance: u32 },
    /// Several implicit candidates at the same `distance`.
    Ambiguous { distance: u32 },
    /// A fixed value.
    Value,
    /// An explicitly absent value.
    Null,
}

impl InitializerKind {
    fn is_direct(self) -> bool {
        matches!(self, InitializerKind::Explicit | InitializerKind::Value | InitializerKind::Null)
    }
}

/// Outcome of a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    KeepPrevious,
    Replace,
    /// Keep both; resolving the key fails until clarified.
    Ambiguous,
    /// Reject the incoming registration with `DependencyError::Duplicate`.
    Conflict,
}

pub trait ConflictPolicy: Send + Sync + fmt::Debug {
    fn resolve(
        &self,
        key: &DependencyKey,
        previous: InitializerKind,
        current: InitializerKind,
    ) -> ConflictResolution;
}

/// Faults on direct redefinitions, prefers direct over bound registrations
/// and nearer bound registrations over farther ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConflictPolicy;

impl ConflictPolicy for DefaultConflictPolicy {
    fn resolve(
        &self,
        _key: &DependencyKey,
        previous: InitializerKind,
        current: InitializerKind,
    ) -> ConflictResolution {
        use InitializerKind::*;

        match (previous, current) {
            (prev, cur) if prev.is_direct() && cur.is_direct() => ConflictResolution::Conflict,
            (prev, _) if prev.is_direct() => ConflictResolution::KeepPrevious,
            (_, cur) if cur.is_direct() => ConflictResolution::Replace,
            (Implicit { distance: prev } | Ambiguous { distance: prev }, Implicit { distance: cur })
            | (Implicit { distance: prev } | Ambiguous { distance: prev }, Ambiguous { distance: cur }) => {
                match prev.cmp(&cur) {
                    std::cmp::Ordering::Less => ConflictResolution::KeepPrevious,
                    std::cmp::Ordering::Greater => ConflictResolution::Replace,
                    std::cmp::Ordering::Equal => ConflictResolution::Ambiguous,
                }
            }
            _ => ConflictResolution::Ambiguous,
        }
    }
}

/// Like [`DefaultConflictPolicy`], except a direct redefinition replaces
/// the previous one. Useful for test overrides.
#[derive(Debug, Clone, Copy, Default)]
pub struct IgnoreConflicts;

impl ConflictPolicy for IgnoreConflicts {
    fn resolve(
        &self,
        key: &DependencyKey,
        previous: InitializerKind,
        current: InitializerKind,
    ) -> ConflictResolution {
        match DefaultConflictPolicy.resolve(key, previous, current) {
            ConflictResolution::Conflict => ConflictResolution::Replace,
            other => other,
        }
    }
}
