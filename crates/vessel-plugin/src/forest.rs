//! Walks over the per-category specialization forest.
//!
//! Both the in-process [`crate::Registry`] and the out-of-process
//! [`crate::RegistrySnapshot`] implement [`Forest`], so capability lookup and
//! detection answer identically on either side.

use crate::PluginError;
use std::collections::{HashMap, HashSet};
use vessel_schema::{Category, ComponentName};

pub trait Forest {
    /// Declared parents of a component, or `None` if it is not registered.
    fn declared_parents(&self, category: Category, name: &str) -> Option<&[ComponentName]>;

    /// Every registered component of a category, in registration order.
    fn component_names(&self, category: Category) -> Vec<ComponentName>;
}

pub trait CapabilityIndex: Forest {
    /// Whether `name` itself (ignoring parents) declares `capability`.
    fn declares(&self, category: Category, name: &str, capability: &str) -> bool;
}

/// The component followed by its ancestors: depth-first, first-declared
/// parent first, each ancestor listed once.
pub fn ancestry<F: Forest + ?Sized>(
    forest: &F,
    category: Category,
    name: &str,
) -> Result<Vec<ComponentName>, PluginError> {
    let mut out = Vec::new();
    let mut path = Vec::new();
    let mut visited = HashSet::new();
    visit(forest, category, name, &mut path, &mut visited, &mut out)?;
    Ok(out)
}

fn visit<F: Forest + ?Sized>(
    forest: &F,
    category: Category,
    name: &str,
    path: &mut Vec<ComponentName>,
    visited: &mut HashSet<ComponentName>,
    out: &mut Vec<ComponentName>,
) -> Result<(), PluginError> {
    if let Some(pos) = path.iter().position(|p| p == name) {
        let mut cycle = path[pos..].to_vec();
        cycle.push(ComponentName::new(name));
        return Err(PluginError::InvalidComponentGraph { category, cycle });
    }
    if visited.contains(name) {
        return Ok(());
    }

    let parents = forest
        .declared_parents(category, name)
        .ok_or_else(|| PluginError::UnknownComponent {
            category,
            name: ComponentName::new(name),
        })?;

    let current = ComponentName::new(name);
    visited.insert(current.clone());
    out.push(current.clone());
    path.push(current);
    for parent in parents {
        visit(forest, category, parent, path, visited, out)?;
    }
    path.pop();
    Ok(())
}

/// Length of the longest parent chain above `name`; roots are 0.
pub fn specificity<F: Forest + ?Sized>(
    forest: &F,
    category: Category,
    name: &str,
) -> Result<usize, PluginError> {
    let mut memo = HashMap::new();
    depth(forest, category, name, &mut Vec::new(), &mut memo)
}

fn depth<F: Forest + ?Sized>(
    forest: &F,
    category: Category,
    name: &str,
    path: &mut Vec<ComponentName>,
    memo: &mut HashMap<ComponentName, usize>,
) -> Result<usize, PluginError> {
    if let Some(pos) = path.iter().position(|p| p == name) {
        let mut cycle = path[pos..].to_vec();
        cycle.push(ComponentName::new(name));
        return Err(PluginError::InvalidComponentGraph { category, cycle });
    }
    if let Some(d) = memo.get(name) {
        return Ok(*d);
    }

    let parents = forest
        .declared_parents(category, name)
        .ok_or_else(|| PluginError::UnknownComponent {
            category,
            name: ComponentName::new(name),
        })?;

    path.push(ComponentName::new(name));
    let mut deepest = None;
    for parent in parents {
        let d = depth(forest, category, parent, path, memo)?;
        deepest = Some(deepest.map_or(d, |cur: usize| cur.max(d)));
    }
    path.pop();

    let d = deepest.map_or(0, |d| d + 1);
    memo.insert(ComponentName::new(name), d);
    Ok(d)
}

/// Check every component of a category for dangling parents and cycles.
pub fn validate_category<F: Forest + ?Sized>(
    forest: &F,
    category: Category,
) -> Result<(), PluginError> {
    let mut memo = HashMap::new();
    for name in forest.component_names(category) {
        depth(forest, category, &name, &mut Vec::new(), &mut memo)?;
    }
    Ok(())
}

/// The nearest component in `name`'s ancestry that declares `capability`.
pub fn capability_owner<F: CapabilityIndex + ?Sized>(
    forest: &F,
    category: Category,
    name: &str,
    capability: &str,
) -> Result<Option<ComponentName>, PluginError> {
    Ok(ancestry(forest, category, name)?
        .into_iter()
        .find(|candidate| forest.declares(category, candidate, capability)))
}

/// Choose the most specific of the components whose predicates matched.
///
/// The whole category is validated first, so a broken graph is reported even
/// when the matches themselves are unaffected.
pub fn pick_most_specific<F: Forest + ?Sized>(
    forest: &F,
    category: Category,
    matched: &[ComponentName],
) -> Result<ComponentName, PluginError> {
    validate_category(forest, category)?;

    let mut scored = Vec::with_capacity(matched.len());
    for name in matched {
        scored.push((specificity(forest, category, name)?, name));
    }

    let Some(best) = scored.iter().map(|(d, _)| *d).max() else {
        return Err(PluginError::DetectionFailed { category });
    };

    let mut top: Vec<ComponentName> = scored
        .into_iter()
        .filter(|(d, _)| *d == best)
        .map(|(_, n)| n.clone())
        .collect();

    if top.len() > 1 {
        return Err(PluginError::AmbiguousDetection {
            category,
            candidates: top,
        });
    }
    Ok(top.remove(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};

    #[derive(Default)]
    struct MapForest {
        order: Vec<ComponentName>,
        parents: BTreeMap<ComponentName, Vec<ComponentName>>,
        caps: BTreeSet<(String, String)>,
    }

    impl MapForest {
        fn node(mut self, name: &str, parents: &[&str]) -> Self {
            self.order.push(name.into());
            self.parents.insert(
                name.into(),
                parents.iter().map(|p| ComponentName::from(*p)).collect(),
            );
            self
        }

        fn cap(mut self, name: &str, cap: &str) -> Self {
            self.caps.insert((name.to_owned(), cap.to_owned()));
            self
        }
    }

    impl Forest for MapForest {
        fn declared_parents(&self, _category: Category, name: &str) -> Option<&[ComponentName]> {
            self.parents.get(name).map(Vec::as_slice)
        }

        fn component_names(&self, _category: Category) -> Vec<ComponentName> {
            self.order.clone()
        }
    }

    impl CapabilityIndex for MapForest {
        fn declares(&self, _category: Category, name: &str, capability: &str) -> bool {
            self.caps
                .contains(&(name.to_owned(), capability.to_owned()))
        }
    }

    const G: Category = Category::Guest;

    #[test]
    fn ancestry_is_depth_first_left_to_right() {
        let f = MapForest::default()
            .node("child", &["left", "right"])
            .node("left", &["left_root"])
            .node("left_root", &[])
            .node("right", &["right_root"])
            .node("right_root", &[]);
        let chain = ancestry(&f, G, "child").unwrap();
        assert_eq!(
            chain,
            vec!["child", "left", "left_root", "right", "right_root"]
        );
    }

    #[test]
    fn diamond_ancestor_listed_once() {
        let f = MapForest::default()
            .node("d", &["b", "c"])
            .node("b", &["a"])
            .node("c", &["a"])
            .node("a", &[]);
        let chain = ancestry(&f, G, "d").unwrap();
        assert_eq!(chain, vec!["d", "b", "a", "c"]);
    }

    #[test]
    fn cycle_is_rejected() {
        let f = MapForest::default().node("a", &["b"]).node("b", &["a"]);
        let err = ancestry(&f, G, "a").unwrap_err();
        match err {
            PluginError::InvalidComponentGraph { cycle, .. } => {
                assert_eq!(cycle, vec!["a", "b", "a"]);
            }
            other => panic!("expected cycle, got {other}"),
        }
        assert!(specificity(&f, G, "b").is_err());
    }

    #[test]
    fn dangling_parent_is_unknown_component() {
        let f = MapForest::default().node("a", &["ghost"]);
        let err = ancestry(&f, G, "a").unwrap_err();
        assert!(matches!(err, PluginError::UnknownComponent { name, .. } if name == "ghost"));
    }

    #[test]
    fn specificity_uses_longest_chain() {
        let f = MapForest::default()
            .node("root", &[])
            .node("mid", &["root"])
            .node("leaf", &["root", "mid"]);
        assert_eq!(specificity(&f, G, "root").unwrap(), 0);
        assert_eq!(specificity(&f, G, "mid").unwrap(), 1);
        assert_eq!(specificity(&f, G, "leaf").unwrap(), 2);
    }

    #[test]
    fn capability_owner_prefers_self_then_nearest() {
        let f = MapForest::default()
            .node("child", &["parent"])
            .node("parent", &[])
            .cap("parent", "x");
        assert_eq!(
            capability_owner(&f, G, "child", "x").unwrap().as_deref(),
            Some("parent")
        );
        let f = f.cap("child", "x");
        assert_eq!(
            capability_owner(&f, G, "child", "x").unwrap().as_deref(),
            Some("child")
        );
        assert!(capability_owner(&f, G, "child", "y").unwrap().is_none());
    }

    #[test]
    fn pick_prefers_deepest_match() {
        let f = MapForest::default()
            .node("linux", &[])
            .node("debian", &["linux"])
            .node("ubuntu", &["debian"]);
        let picked =
            pick_most_specific(&f, G, &["linux".into(), "ubuntu".into(), "debian".into()])
                .unwrap();
        assert_eq!(picked, "ubuntu");
    }

    #[test]
    fn pick_reports_ties() {
        let f = MapForest::default()
            .node("linux", &[])
            .node("arch", &["linux"])
            .node("gentoo", &["linux"]);
        let err = pick_most_specific(&f, G, &["arch".into(), "gentoo".into()]).unwrap_err();
        match err {
            PluginError::AmbiguousDetection { candidates, .. } => {
                assert_eq!(candidates, vec!["arch", "gentoo"]);
            }
            other => panic!("expected ambiguity, got {other}"),
        }
    }

    #[test]
    fn pick_without_matches_fails() {
        let f = MapForest::default().node("linux", &[]);
        assert!(matches!(
            pick_most_specific(&f, G, &[]),
            Err(PluginError::DetectionFailed { .. })
        ));
    }

    #[test]
    fn pick_validates_unrelated_cycles() {
        let f = MapForest::default()
            .node("linux", &[])
            .node("a", &["b"])
            .node("b", &["a"]);
        assert!(matches!(
            pick_most_specific(&f, G, &["linux".into()]),
            Err(PluginError::InvalidComponentGraph { .. })
        ));
    }
}
