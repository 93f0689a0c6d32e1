use super::{Visit, VisitMut};
use crate::value::Value;
use indexmap::IndexMap;

/// Recursively visit all string [Value]s mutably
///
/// The visitor receives the enclosing [Value] so it may replace the string with something else
/// (a lazily produced object for example). Replacements are not visited again.
pub trait VisitStringsMut {
    fn visit_strings_mut(&mut self, visitor: &mut dyn VisitMut<Value>);
}

impl VisitStringsMut for Value {
    fn visit_strings_mut(&mut self, visitor: &mut dyn VisitMut<Value>) {
        match self {
            Value::String(_) => visitor.visit_mut(self),
            Value::Array(array) => {
                for value in array {
                    value.visit_strings_mut(visitor);
                }
            }
            Value::Object(object) => object.visit_strings_mut(visitor),
            Value::Null | Value::Boolean(_) | Value::Integer(_) | Value::Decimal(_) => {}
        }
    }
}

impl VisitStringsMut for IndexMap<String, Value> {
    fn visit_strings_mut(&mut self, visitor: &mut dyn VisitMut<Value>) {
        for value in self.values_mut() {
            value.visit_strings_mut(visitor);
        }
    }
}

/// Recursively visit all strings, including object keys
pub trait VisitStrings {
    fn visit_strings(&self, visitor: &mut dyn Visit<str>);
}

impl VisitStrings for Value {
    fn visit_strings(&self, visitor: &mut dyn Visit<str>) {
        match self {
            Value::String(s) => visitor.visit(s),
            Value::Array(array) => {
                for value in array {
                    value.visit_strings(visitor);
                }
            }
            Value::Object(object) => object.visit_strings(visitor),
            Value::Null | Value::Boolean(_) | Value::Integer(_) | Value::Decimal(_) => {}
        }
    }
}

impl VisitStrings for IndexMap<String, Value> {
    fn visit_strings(&self, visitor: &mut dyn Visit<str>) {
        for (key, value) in self {
            visitor.visit(key);
            value.visit_strings(visitor);
        }
    }
}
