//! # Extension Registry
//!
//! Resolves the two kinds of names a JSON document can use to refer to types that the
//! target message does not declare itself:
//!
//! * extension fields, written as `"[my.pkg.extension_name]"` keys;
//! * the concrete type packed in a `google.protobuf.Any`, written as a type URL in
//!   the `"@type"` key.
//!
//! The registry is built once from a whole [`SchemaGraph`] and passed explicitly to
//! the [`GenericMessageFactory`](super::GenericMessageFactory). Nothing is registered
//! globally. When two files define the same name, the first file by name wins.
//!
//! A message can only carry an extension that is linked into its own schema file's
//! imports. [`ExtensionRegistry::extension_for`] checks that and returns the
//! extension as seen from the message.
use crate::schema::{SchemaGraph, SchemaUnit};
use prost_reflect::{ExtensionDescriptor, MessageDescriptor};
use std::collections::HashMap;

const TYPE_URL_PREFIX: &str = "type.googleapis.com/";

#[derive(Debug, Clone, Default)]
pub struct ExtensionRegistry {
    /// (extended message full name, field number) -> extension
    extensions: HashMap<(String, u32), ExtensionDescriptor>,
    /// extension full name -> extension
    extensions_by_name: HashMap<String, ExtensionDescriptor>,
    /// message full name -> message
    messages: HashMap<String, MessageDescriptor>,
}

impl ExtensionRegistry {
    /// Registers the extensions and message types of every unit in the graph.
    pub fn from_graph(graph: &SchemaGraph) -> Self {
        let mut registry = Self::default();
        for unit in graph.units() {
            registry.add_unit(unit);
        }
        tracing::debug!(
            extensions = registry.extensions.len(),
            messages = registry.messages.len(),
            "built extension registry"
        );
        registry
    }

    /// Registers the extensions and message types declared in one unit.
    pub fn add_unit(&mut self, unit: &SchemaUnit) {
        for extension in unit.all_extensions() {
            self.add_extension(extension);
        }
        for message in unit.all_messages() {
            self.messages
                .entry(message.full_name().to_string())
                .or_insert(message);
        }
    }

    fn add_extension(&mut self, extension: ExtensionDescriptor) {
        let extendee = extension.containing_message().full_name().to_string();
        self.extensions_by_name
            .entry(extension.full_name().to_string())
            .or_insert_with(|| extension.clone());
        self.extensions
            .entry((extendee, extension.number()))
            .or_insert(extension);
    }

    /// Finds the extension numbered `number` that extends `extendee` (a message full name).
    pub fn find_extension(&self, extendee: &str, number: u32) -> Option<&ExtensionDescriptor> {
        self.extensions.get(&(extendee.to_string(), number))
    }

    /// Finds an extension by its full name (e.g. `my.pkg.priority`).
    pub fn find_extension_by_name(&self, full_name: &str) -> Option<&ExtensionDescriptor> {
        self.extensions_by_name.get(full_name)
    }

    /// All extensions of the message type `extendee`, ordered by field number.
    pub fn extensions_of(&self, extendee: &str) -> Vec<&ExtensionDescriptor> {
        let mut extensions: Vec<_> = self
            .extensions
            .iter()
            .filter(|((name, _), _)| name == extendee)
            .map(|(_, extension)| extension)
            .collect();
        extensions.sort_by_key(|e| e.number());
        extensions
    }

    /// Finds the extension `full_name` of `message`, taken from the message's own pool.
    ///
    /// `None` when the registry does not know the extension, when it extends another
    /// type, or when it is not visible from the file that defines `message`.
    pub fn extension_for(
        &self,
        message: &MessageDescriptor,
        full_name: &str,
    ) -> Option<ExtensionDescriptor> {
        let known = self.find_extension_by_name(full_name)?;
        if known.containing_message().full_name() != message.full_name() {
            return None;
        }
        message
            .parent_pool()
            .get_extension_by_name(full_name)
            .filter(|extension| extension.containing_message() == *message)
    }

    /// The registered extensions `message` can carry, ordered by field number.
    pub fn extensions_for(&self, message: &MessageDescriptor) -> Vec<ExtensionDescriptor> {
        self.extensions_of(message.full_name())
            .into_iter()
            .filter_map(|extension| self.extension_for(message, extension.full_name()))
            .collect()
    }

    /// Resolves the message type named by a type URL.
    ///
    /// Only the part after the last `/` is significant, so any host prefix is accepted.
    pub fn resolve_type_url(&self, type_url: &str) -> Option<&MessageDescriptor> {
        let full_name = type_url.rsplit_once('/').map_or(type_url, |(_, name)| name);
        self.messages.get(full_name)
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty() && self.messages.is_empty()
    }
}

/// The canonical type URL of a message type.
pub fn type_url(message: &MessageDescriptor) -> String {
    format!("{TYPE_URL_PREFIX}{}", message.full_name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use greeter_service::descriptors::catalog_file_descriptor_set;

    fn registry() -> ExtensionRegistry {
        let graph = SchemaGraph::from_file_descriptor_set(catalog_file_descriptor_set()).unwrap();
        ExtensionRegistry::from_graph(&graph)
    }

    #[test]
    fn test_extensions_are_registered_by_number_and_name() {
        let registry = registry();

        let by_number = registry.find_extension("shop.Legacy", 100).unwrap();
        assert_eq!(by_number.full_name(), "shop.priority");

        let by_name = registry.find_extension_by_name("shop.priority").unwrap();
        assert_eq!(by_name.number(), 100);

        assert!(registry.find_extension("shop.Legacy", 101).is_none());
        assert_eq!(registry.extensions_of("shop.Legacy").len(), 1);
        assert!(registry.extensions_of("shop.Order").is_empty());
    }

    #[test]
    fn test_type_urls_resolve_nested_and_cross_file_messages() {
        let registry = registry();

        let coupon = registry
            .resolve_type_url("type.googleapis.com/shop.Coupon")
            .unwrap();
        assert_eq!(type_url(coupon), "type.googleapis.com/shop.Coupon");

        assert!(registry.resolve_type_url("example.com/x/shop.Order.StockEntry").is_some());
        assert!(registry.resolve_type_url("shop.Item").is_some());
        assert!(registry.resolve_type_url("type.googleapis.com/shop.Ghost").is_none());
    }

    #[test]
    fn test_extensions_are_seen_from_the_extended_message() {
        let graph = SchemaGraph::from_file_descriptor_set(catalog_file_descriptor_set()).unwrap();
        let registry = ExtensionRegistry::from_graph(&graph);

        // shop/order.proto imports the extension, shop/legacy.proto does not.
        let legacy = graph
            .get("shop/order.proto")
            .and_then(|unit| unit.find_message("shop.Order"))
            .and_then(|order| order.get_field_by_name("legacy"))
            .and_then(|field| field.kind().as_message().cloned())
            .unwrap();
        let priority = registry.extension_for(&legacy, "shop.priority").unwrap();
        assert_eq!(priority.containing_message(), legacy);
        assert_eq!(registry.extensions_for(&legacy).len(), 1);

        let bare_legacy = graph
            .get("shop/legacy.proto")
            .and_then(|unit| unit.find_message("shop.Legacy"))
            .unwrap();
        assert!(registry.extension_for(&bare_legacy, "shop.priority").is_none());
        assert!(registry.extensions_for(&bare_legacy).is_empty());

        let coupon = graph
            .get("shop/coupon.proto")
            .and_then(|unit| unit.find_message("shop.Coupon"))
            .unwrap();
        assert!(registry.extension_for(&coupon, "shop.priority").is_none());
    }

    #[test]
    fn test_empty_registry() {
        assert!(ExtensionRegistry::default().is_empty());
        assert!(!registry().is_empty());
    }
}
