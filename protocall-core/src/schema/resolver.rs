//! # Schema Graph Resolver
//!
//! Links an unordered protoset into a [`SchemaGraph`].
//!
//! Files are linked depth first: a file is only linked once every file it imports
//! has been linked. Each file name moves through two states while resolving
//! (`InProgress`, then `Linked`):
//!
//! * meeting a `Linked` file again returns its unit immediately, which is what links
//!   a file shared by several importers (the diamond case) exactly once;
//! * meeting an `InProgress` file again means the current import chain loops back
//!   on itself, and resolution fails with [`SchemaError::CyclicDependency`].
//!
//! Every unit gets its own `DescriptorPool` holding only the file and its transitive
//! imports, so type references resolve strictly against what the file imports. Two
//! unrelated files may define the same fully qualified name; only a file importing
//! both of them fails to link.
//!
//! All of this state lives in the resolver instance, never in globals, so
//! independent resolutions cannot interfere with each other.
use super::{SchemaError, SchemaGraph, SchemaUnit};
use prost_reflect::{DescriptorPool, FileDescriptor};
use prost_types::{FileDescriptorProto, FileDescriptorSet};
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Linked,
}

/// Resolves the dependency graph of a protoset.
pub struct SchemaGraphResolver {
    definitions: HashMap<String, FileDescriptorProto>,
    visits: HashMap<String, Visit>,
    /// Import chain currently being linked, used to report cycles.
    path: Vec<String>,
    units: BTreeMap<String, Arc<SchemaUnit>>,
}

impl SchemaGraphResolver {
    /// Links every file of `bundle`.
    ///
    /// # Returns
    ///
    /// * `Ok(SchemaGraph)` - Every file of the bundle, linked.
    /// * `Err(SchemaError)` - The first file that could not be linked. No partial graph is returned.
    pub fn resolve(bundle: FileDescriptorSet) -> Result<SchemaGraph, SchemaError> {
        let mut resolver = Self::new(bundle.file)?;

        let mut names: Vec<String> = resolver.definitions.keys().cloned().collect();
        names.sort();

        for name in &names {
            resolver.link(name)?;
        }

        let graph = SchemaGraph::new(resolver.units);
        tracing::debug!(files = graph.len(), "resolved schema bundle");
        Ok(graph)
    }

    fn new(files: Vec<FileDescriptorProto>) -> Result<Self, SchemaError> {
        let mut definitions: HashMap<String, FileDescriptorProto> =
            HashMap::with_capacity(files.len());

        for file in files {
            let name = file.name().to_string();
            match definitions.get(&name) {
                Some(existing) if *existing != file => return Err(SchemaError::DuplicateFile(name)),
                Some(_) => tracing::trace!(file = %name, "ignoring identical duplicate file"),
                None => {
                    definitions.insert(name, file);
                }
            }
        }

        Ok(Self {
            definitions,
            visits: HashMap::new(),
            path: Vec::new(),
            units: BTreeMap::new(),
        })
    }

    fn link(&mut self, name: &str) -> Result<Arc<SchemaUnit>, SchemaError> {
        match self.visits.get(name) {
            Some(Visit::Linked) => {
                if let Some(unit) = self.units.get(name) {
                    return Ok(Arc::clone(unit));
                }
            }
            Some(Visit::InProgress) => return Err(self.cycle_error(name)),
            None => {}
        }

        let Some(definition) = self.definitions.get(name) else {
            // Dependencies are checked before recursing, so only a caller passing an
            // unknown root name ends up here.
            return Err(SchemaError::UnknownDependency {
                file: self.path.last().cloned().unwrap_or_default(),
                dependency: name.to_string(),
            });
        };
        let dependencies = definition.dependency.clone();

        self.visits.insert(name.to_string(), Visit::InProgress);
        self.path.push(name.to_string());

        let mut units = Vec::with_capacity(dependencies.len());
        for dependency in &dependencies {
            if !self.definitions.contains_key(dependency) {
                return Err(SchemaError::UnknownDependency {
                    file: name.to_string(),
                    dependency: dependency.clone(),
                });
            }
            units.push(self.link(dependency)?);
        }

        let unit = Arc::new(SchemaUnit::new(self.build_file(name)?, units));

        self.path.pop();
        self.visits.insert(name.to_string(), Visit::Linked);
        self.units.insert(name.to_string(), Arc::clone(&unit));
        tracing::trace!(file = name, dependencies = dependencies.len(), "linked schema file");

        Ok(unit)
    }

    /// Builds the pool of `name` from its transitive imports, dependencies first.
    fn build_file(&self, name: &str) -> Result<FileDescriptor, SchemaError> {
        let invalid = |source| SchemaError::InvalidSchema {
            file: name.to_string(),
            source,
        };

        let mut order = Vec::new();
        self.collect_imports(name, &mut HashSet::new(), &mut order);
        order.push(name);

        let mut pool = DescriptorPool::new();
        for file in order {
            if let Some(definition) = self.definitions.get(file) {
                pool.add_file_descriptor_proto(definition.clone())
                    .map_err(invalid)?;
            }
        }

        pool.get_file_by_name(name).ok_or_else(|| SchemaError::UnknownDependency {
            file: name.to_string(),
            dependency: name.to_string(),
        })
    }

    /// Post-order walk of the imports of `name`. Only called once every import is linked,
    /// so the walk cannot loop.
    fn collect_imports<'a>(
        &'a self,
        name: &str,
        seen: &mut HashSet<&'a str>,
        order: &mut Vec<&'a str>,
    ) {
        let Some(definition) = self.definitions.get(name) else {
            return;
        };
        for dependency in &definition.dependency {
            if seen.insert(dependency.as_str()) {
                self.collect_imports(dependency, seen, order);
                order.push(dependency.as_str());
            }
        }
    }

    fn cycle_error(&self, name: &str) -> SchemaError {
        let start = self.path.iter().position(|p| p == name).unwrap_or(0);
        let mut cycle = self.path[start..].to_vec();
        cycle.push(name.to_string());
        SchemaError::CyclicDependency { cycle }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use greeter_service::descriptors::{file, message, scalar, typed};
    use prost_types::field_descriptor_proto::Type;

    fn bundle(files: Vec<FileDescriptorProto>) -> FileDescriptorSet {
        FileDescriptorSet { file: files }
    }

    #[test]
    fn test_diamond_dependency_is_linked_once() {
        let graph = SchemaGraphResolver::resolve(bundle(vec![
            file("a.proto", "a", &["b.proto", "c.proto"]),
            file("c.proto", "c", &["d.proto"]),
            file("d.proto", "d", &[]),
            file("b.proto", "b", &["d.proto"]),
        ]))
        .unwrap();

        assert_eq!(graph.len(), 4);

        let a = graph.get("a.proto").unwrap();
        let b = graph.get("b.proto").unwrap();
        let c = graph.get("c.proto").unwrap();
        let d = graph.get("d.proto").unwrap();

        assert!(Arc::ptr_eq(&a.dependencies()[0], b));
        assert!(Arc::ptr_eq(&a.dependencies()[1], c));
        assert!(Arc::ptr_eq(&b.dependencies()[0], d));
        assert!(Arc::ptr_eq(&c.dependencies()[0], d));
        assert!(Arc::ptr_eq(&b.dependencies()[0], &c.dependencies()[0]));

        // The graph itself holds one handle and b and c one each.
        assert_eq!(Arc::strong_count(d), 3);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let result = SchemaGraphResolver::resolve(bundle(vec![
            file("x.proto", "x", &["y.proto"]),
            file("y.proto", "y", &["x.proto"]),
        ]));

        match result {
            Err(SchemaError::CyclicDependency { cycle }) => {
                assert_eq!(cycle, vec!["x.proto", "y.proto", "x.proto"]);
            }
            other => panic!("Expected CyclicDependency, got: {:?}", other),
        }
    }

    #[test]
    fn test_self_import_is_a_cycle() {
        let result = SchemaGraphResolver::resolve(bundle(vec![file(
            "self.proto",
            "s",
            &["self.proto"],
        )]));

        assert!(matches!(
            result,
            Err(SchemaError::CyclicDependency { cycle }) if cycle == vec!["self.proto", "self.proto"]
        ));
    }

    #[test]
    fn test_missing_dependency_is_named() {
        let result = SchemaGraphResolver::resolve(bundle(vec![file(
            "p.proto",
            "p",
            &["missing.proto"],
        )]));

        assert!(matches!(
            result,
            Err(SchemaError::UnknownDependency { file, dependency })
                if file == "p.proto" && dependency == "missing.proto"
        ));
    }

    #[test]
    fn test_types_from_dependencies_resolve() {
        let mut common = file("common.proto", "common", &[]);
        common
            .message_type
            .push(message("Money", vec![scalar("units", 1, Type::Int64)]));

        let mut shop = file("shop.proto", "shop", &["common.proto"]);
        shop.message_type.push(message(
            "Price",
            vec![typed("amount", 1, Type::Message, ".common.Money")],
        ));

        let graph = SchemaGraphResolver::resolve(bundle(vec![shop, common])).unwrap();

        let price = graph
            .get("shop.proto")
            .and_then(|unit| unit.find_message("shop.Price"))
            .unwrap();
        let amount = price.get_field_by_name("amount").unwrap();
        assert_eq!(
            amount.kind().as_message().map(|m| m.full_name().to_string()),
            Some("common.Money".to_string())
        );
    }

    #[test]
    fn test_unresolvable_type_is_invalid_schema() {
        let mut shop = file("shop.proto", "shop", &[]);
        shop.message_type.push(message(
            "Price",
            vec![typed("amount", 1, Type::Message, ".common.Money")],
        ));

        let result = SchemaGraphResolver::resolve(bundle(vec![shop]));

        assert!(matches!(
            result,
            Err(SchemaError::InvalidSchema { file, .. }) if file == "shop.proto"
        ));
    }

    #[test]
    fn test_conflicting_duplicate_file_is_rejected() {
        let result = SchemaGraphResolver::resolve(bundle(vec![
            file("a.proto", "a", &[]),
            file("a.proto", "other", &[]),
        ]));

        assert!(matches!(result, Err(SchemaError::DuplicateFile(name)) if name == "a.proto"));
    }

    #[test]
    fn test_identical_duplicate_file_is_tolerated() {
        let graph = SchemaGraphResolver::resolve(bundle(vec![
            file("a.proto", "a", &[]),
            file("a.proto", "a", &[]),
        ]))
        .unwrap();

        assert_eq!(graph.file_names().collect::<Vec<_>>(), vec!["a.proto"]);
    }

    #[test]
    fn test_independent_resolutions_do_not_share_state() {
        let first = SchemaGraphResolver::resolve(bundle(vec![file("a.proto", "a", &[])])).unwrap();
        let second = SchemaGraphResolver::resolve(bundle(vec![file("b.proto", "b", &[])])).unwrap();

        assert!(first.contains("a.proto") && !first.contains("b.proto"));
        assert!(second.contains("b.proto") && !second.contains("a.proto"));
    }

    fn defines_foo(name: &str, dependencies: &[&str]) -> FileDescriptorProto {
        let mut proto = file(name, "dup", dependencies);
        proto
            .message_type
            .push(message("Foo", vec![scalar("id", 1, Type::String)]));
        proto
    }

    #[test]
    fn test_unrelated_files_may_define_the_same_name() {
        let graph = SchemaGraphResolver::resolve(bundle(vec![
            defines_foo("b.proto", &[]),
            defines_foo("a.proto", &[]),
        ]))
        .unwrap();

        for name in ["a.proto", "b.proto"] {
            let foo = graph.get(name).and_then(|unit| unit.find_message("dup.Foo"));
            assert_eq!(foo.unwrap().parent_file().name(), name);
        }
    }

    #[test]
    fn test_importing_two_definitions_of_a_name_is_invalid() {
        let result = SchemaGraphResolver::resolve(bundle(vec![
            defines_foo("a.proto", &[]),
            defines_foo("b.proto", &[]),
            file("both.proto", "both", &["a.proto", "b.proto"]),
        ]));

        assert!(matches!(
            result,
            Err(SchemaError::InvalidSchema { file, .. }) if file == "both.proto"
        ));
    }

    #[test]
    fn test_types_resolve_only_through_imports() {
        let mut other = file("other.proto", "other", &[]);
        other
            .message_type
            .push(message("Money", vec![scalar("units", 1, Type::Int64)]));

        let mut shop = file("shop.proto", "shop", &[]);
        shop.message_type.push(message(
            "Price",
            vec![typed("amount", 1, Type::Message, ".other.Money")],
        ));

        let result = SchemaGraphResolver::resolve(bundle(vec![other, shop]));

        assert!(matches!(
            result,
            Err(SchemaError::InvalidSchema { file, .. }) if file == "shop.proto"
        ));
    }
}
