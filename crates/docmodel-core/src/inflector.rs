//! Naming conventions for classes, relations and collections.

use heck::{ToSnakeCase, ToUpperCamelCase};

/// `addresses` -> `address`, `people` -> `person`.
pub fn singularize(word: &str) -> String {
    pluralizer::pluralize(word, 1, false)
}

/// `person` -> `people`.
pub fn pluralize(word: &str) -> String {
    pluralizer::pluralize(word, 2, false)
}

/// `ShippingAddress` -> `shipping_address`.
pub fn underscore(word: &str) -> String {
    word.to_snake_case()
}

/// `shipping_address` -> `ShippingAddress`. Does not singularize.
pub fn classify(word: &str) -> String {
    word.to_upper_camel_case()
}

/// Collection name of a class: `Person` -> `people`.
pub fn tableize(class_name: &str) -> String {
    pluralize(&underscore(class_name))
}
