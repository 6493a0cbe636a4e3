//! Dependency resolution over the `requires` graph
//!
//! The graph is rebuilt from the repository on every call. Edge `A -> B`
//! means "A requires B".

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use hostpanel_core::version;

use crate::PluginResult;
use crate::entity::Plugin;
use crate::ports::PluginRepository;

pub struct DependencyResolver {
    repository: Arc<dyn PluginRepository>,
}

impl DependencyResolver {
    pub fn new(repository: Arc<dyn PluginRepository>) -> Self {
        Self { repository }
    }

    /// Every other plugin whose `requires` names this plugin, in any state
    pub fn get_dependents(&self, plugin: &Plugin) -> PluginResult<Vec<Plugin>> {
        Ok(self
            .repository
            .find_all()?
            .into_iter()
            .filter(|other| other.name != plugin.name && other.requires_plugin(&plugin.name))
            .collect())
    }

    /// Dependents that are currently enabled
    pub fn get_enabled_dependents(&self, plugin: &Plugin) -> PluginResult<Vec<Plugin>> {
        Ok(self
            .get_dependents(plugin)?
            .into_iter()
            .filter(Plugin::is_enabled)
            .collect())
    }

    /// One message per requirement that is missing or whose constraint the
    /// installed version does not satisfy
    pub fn validate_dependencies(&self, plugin: &Plugin) -> PluginResult<Vec<String>> {
        let mut errors = Vec::new();

        for (name, constraint) in &plugin.requires {
            let Some(installed) = self.repository.find_by_name(name)? else {
                errors.push(format!(
                    "Required plugin '{}' ({}) is not installed",
                    name, constraint
                ));
                continue;
            };

            match version::satisfies_str(&installed.version, constraint) {
                Ok(true) => {}
                Ok(false) => errors.push(format!(
                    "Required plugin '{}' must satisfy '{}', but version {} is installed",
                    name, constraint, installed.version
                )),
                Err(e) => errors.push(format!(
                    "Cannot check requirement '{}' ({}): {}",
                    name, constraint, e
                )),
            }
        }

        Ok(errors)
    }

    pub fn has_circular_dependency(&self, plugin: &Plugin) -> PluginResult<bool> {
        Ok(self.get_circular_dependency_path(plugin)?.is_some())
    }

    /// First cycle reachable from `plugin`, e.g. `["a", "b", "a"]`
    ///
    /// A plugin requiring itself yields `["a", "a"]`. Requirements on
    /// plugins that are not installed are not traversed.
    pub fn get_circular_dependency_path(&self, plugin: &Plugin) -> PluginResult<Option<Vec<String>>> {
        let mut graph: BTreeMap<String, Vec<String>> = self
            .repository
            .find_all()?
            .into_iter()
            .map(|p| (p.name, p.requires.into_keys().collect()))
            .collect();
        // The caller's copy wins over the stored record
        graph.insert(plugin.name.clone(), plugin.requires.keys().cloned().collect());

        let mut walk = CycleWalk {
            graph: &graph,
            finished: HashSet::new(),
            stack: Vec::new(),
        };
        Ok(walk.visit(&plugin.name))
    }
}

struct CycleWalk<'a> {
    graph: &'a BTreeMap<String, Vec<String>>,
    finished: HashSet<&'a str>,
    stack: Vec<&'a str>,
}

impl<'a> CycleWalk<'a> {
    fn visit(&mut self, node: &'a str) -> Option<Vec<String>> {
        let graph = self.graph;
        self.stack.push(node);

        let edges = graph.get(node).map(Vec::as_slice).unwrap_or_default();
        for next in edges {
            let next = next.as_str();
            if let Some(start) = self.stack.iter().position(|n| *n == next) {
                let mut cycle: Vec<String> =
                    self.stack[start..].iter().map(|n| n.to_string()).collect();
                cycle.push(next.to_string());
                return Some(cycle);
            }
            if self.finished.contains(next) || !graph.contains_key(next) {
                continue;
            }
            if let Some(cycle) = self.visit(next) {
                return Some(cycle);
            }
        }

        self.stack.pop();
        self.finished.insert(node);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryPluginRepository;
    use crate::test_support::plugin_with;

    fn resolver_with(plugins: Vec<Plugin>) -> (DependencyResolver, Arc<InMemoryPluginRepository>) {
        let repo = Arc::new(InMemoryPluginRepository::new());
        for p in &plugins {
            repo.save(p).unwrap();
        }
        (DependencyResolver::new(repo.clone()), repo)
    }

    #[test]
    fn dependents_ignore_state_and_self() {
        let core = plugin_with("core", "1.0.0", &[]);
        let a = plugin_with("reports", "1.0.0", &[("core", "^1.0")]);
        let b = plugin_with("exports", "1.0.0", &[("core", "*")]);
        let c = plugin_with("unrelated", "1.0.0", &[]);
        let (resolver, _) = resolver_with(vec![core.clone(), a, b, c]);

        let names: Vec<String> = resolver
            .get_dependents(&core)
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["exports", "reports"]);
        assert!(resolver.get_enabled_dependents(&core).unwrap().is_empty());
    }

    #[test]
    fn unmet_version_names_requirement_and_installed_version() {
        let needs = plugin_with("needs-plugin", "1.5.0", &[]);
        let plugin = plugin_with("consumer", "1.0.0", &[("needs-plugin", ">=2.0")]);
        let (resolver, _) = resolver_with(vec![needs, plugin.clone()]);

        let errors = resolver.validate_dependencies(&plugin).unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("needs-plugin"));
        assert!(errors[0].contains(">=2.0"));
        assert!(errors[0].contains("1.5.0"));
    }

    #[test]
    fn missing_and_satisfied_requirements() {
        let present = plugin_with("core", "2.3.0", &[]);
        let plugin = plugin_with("consumer", "1.0.0", &[("core", "^2.0"), ("ghost", "*")]);
        let (resolver, _) = resolver_with(vec![present, plugin.clone()]);

        let errors = resolver.validate_dependencies(&plugin).unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("'ghost'"));
        assert!(errors[0].contains("not installed"));
    }

    #[test]
    fn detects_two_node_cycle() {
        let a = plugin_with("a", "1.0.0", &[("b", "*")]);
        let b = plugin_with("b", "1.0.0", &[("a", "*")]);
        let (resolver, _) = resolver_with(vec![a.clone(), b]);

        assert!(resolver.has_circular_dependency(&a).unwrap());
        let path = resolver.get_circular_dependency_path(&a).unwrap().unwrap();
        assert_eq!(path, vec!["a", "b", "a"]);
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let a = plugin_with("a", "1.0.0", &[("a", "*")]);
        let (resolver, _) = resolver_with(vec![a.clone()]);
        assert_eq!(
            resolver.get_circular_dependency_path(&a).unwrap(),
            Some(vec!["a".to_string(), "a".to_string()])
        );
    }

    #[test]
    fn acyclic_diamond_has_no_cycle() {
        let a = plugin_with("a", "1.0.0", &[("b", "*"), ("c", "*")]);
        let b = plugin_with("b", "1.0.0", &[("d", "*")]);
        let c = plugin_with("c", "1.0.0", &[("d", "*")]);
        let d = plugin_with("d", "1.0.0", &[("missing", "*")]);
        let (resolver, _) = resolver_with(vec![a.clone(), b, c, d]);

        assert!(!resolver.has_circular_dependency(&a).unwrap());
        assert!(resolver.get_circular_dependency_path(&a).unwrap().is_none());
    }

    #[test]
    fn reflects_requires_changes_between_calls() {
        let a = plugin_with("a", "1.0.0", &[("b", "*")]);
        let mut b = plugin_with("b", "1.0.0", &[]);
        let (resolver, repo) = resolver_with(vec![a.clone(), b.clone()]);

        assert!(!resolver.has_circular_dependency(&a).unwrap());

        b.requires.insert("a".to_string(), "*".to_string());
        repo.save(&b).unwrap();
        assert!(resolver.has_circular_dependency(&a).unwrap());

        b.requires.clear();
        repo.save(&b).unwrap();
        assert!(!resolver.has_circular_dependency(&a).unwrap());
    }
}
