//! Permission filter
//!
//! Advisory only: hides capabilities the caller cannot perform. The
//! execution gateway re-validates every request, and its rejections come
//! back as ordinary `error` results.

use std::collections::HashSet;

use composer_types::Capability;

/// Answers whether the caller holds a set of permissions.
pub trait PermissionChecker: Send + Sync {
    /// True when the caller holds every permission in `permissions`.
    fn has_all(&self, permissions: &[&str]) -> bool;
}

/// A fixed set of granted permissions.
#[derive(Debug, Clone, Default)]
pub struct PermissionSet {
    granted: HashSet<String>,
}

impl PermissionSet {
    pub fn new<I, S>(granted: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            granted: granted.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, permission: &str) -> bool {
        self.granted.contains(permission)
    }
}

impl PermissionChecker for PermissionSet {
    fn has_all(&self, permissions: &[&str]) -> bool {
        permissions.iter().all(|p| self.granted.contains(*p))
    }
}

/// Keep capabilities whose requirements are empty or fully held.
pub fn filter_capabilities(
    capabilities: Vec<Capability>,
    checker: &dyn PermissionChecker,
) -> Vec<Capability> {
    let total = capabilities.len();
    let permitted: Vec<Capability> = capabilities
        .into_iter()
        .filter(|cap| is_permitted(cap, checker))
        .collect();
    if permitted.len() < total {
        tracing::debug!(
            hidden = total - permitted.len(),
            shown = permitted.len(),
            "permission filter hid capabilities"
        );
    }
    permitted
}

pub fn is_permitted(capability: &Capability, checker: &dyn PermissionChecker) -> bool {
    if capability.required_permissions.is_empty() {
        return true;
    }
    let required: Vec<&str> = capability
        .required_permissions
        .iter()
        .map(String::as_str)
        .collect();
    checker.has_all(&required)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Denies everything, including the empty set.
    struct DenyAll;

    impl PermissionChecker for DenyAll {
        fn has_all(&self, _permissions: &[&str]) -> bool {
            false
        }
    }

    #[test]
    fn empty_requirements_always_retained() {
        let caps = vec![Capability::new("Randevu Listele")];
        assert_eq!(filter_capabilities(caps, &DenyAll).len(), 1);
    }

    #[test]
    fn needs_every_permission() {
        let caps = vec![
            Capability::new("Fatura Kes")
                .with_permission("invoice.create")
                .with_permission("patient.read"),
            Capability::new("Kasa Raporu").with_permission("cashflow.read"),
        ];
        let held = PermissionSet::new(["invoice.create", "cashflow.read"]);
        let kept = filter_capabilities(caps, &held);
        let names: Vec<_> = kept.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Kasa Raporu"]);
    }

    const PERMS: &[&str] = &["a", "b", "c", "d", "e"];

    fn arb_perm_subset() -> impl Strategy<Value = Vec<&'static str>> {
        proptest::sample::subsequence(PERMS, 0..=PERMS.len())
    }

    proptest! {
        #[test]
        fn retained_requirements_are_subsets_of_held(
            requirements in proptest::collection::vec(arb_perm_subset(), 0..8),
            held in arb_perm_subset(),
        ) {
            let caps: Vec<Capability> = requirements
                .iter()
                .enumerate()
                .map(|(i, reqs)| {
                    reqs.iter()
                        .fold(Capability::new(format!("cap-{i}")), |c, p| c.with_permission(*p))
                })
                .collect();
            let set = PermissionSet::new(held.iter().copied());
            let kept = filter_capabilities(caps.clone(), &set);

            for cap in &kept {
                prop_assert!(cap.required_permissions.iter().all(|p| set.contains(p)));
            }
            let expected = caps
                .iter()
                .filter(|c| c.required_permissions.iter().all(|p| set.contains(p)))
                .count();
            prop_assert_eq!(kept.len(), expected);
        }
    }
}
