//! The namespace: a stack of floors over one shadowing name map.
//!
//! Lookup is lexical-scope first-match: the map keeps a stack of bindings
//! per name, newest visible. Each floor records what it inserted so that
//! popping the floor removes exactly those entries, in reverse insertion
//! order, restoring anything it shadowed. Floors also carry the
//! combinations registered while they were open (undefined again on
//! teardown for non-root floors) and arbitrary teardown callbacks.
//!
//! The namespace itself is a dumb container; destroying the values and
//! undefining the combinations needs the compiler, so floor teardown is
//! driven from `Compiler::floor_down`.

use crate::compiler::Compiler;
use crate::value::Value;
use boxc_types::{Comb, Type};
use rustc_hash::FxHashMap;

/// One teardown action registered on a floor.
pub type Teardown = Box<dyn FnOnce(&mut Compiler)>;

/// What a floor inserted, in insertion order.
pub enum FloorItem {
    /// A named value binding.
    Value {
        /// The bound name.
        name: String,
    },
    /// A combination registered while the floor was open.
    Procedure {
        /// The parent type the combination is defined on.
        parent: Type,
        /// The combination itself.
        comb: Comb,
    },
    /// An arbitrary teardown callback.
    Callback(Teardown),
}

#[derive(Default)]
struct Floor {
    items: Vec<FloorItem>,
}

/// The namespace of one compiler instance.
#[derive(Default)]
pub struct Namespace {
    map: FxHashMap<String, Vec<Value>>,
    floors: Vec<Floor>,
}

impl Namespace {
    /// Create a namespace with its root floor.
    pub fn new() -> Self {
        let mut ns = Self::default();
        ns.floor_up();
        ns
    }

    /// Number of open floors; always at least 1.
    pub fn depth(&self) -> usize {
        self.floors.len()
    }

    /// Open a new floor.
    pub fn floor_up(&mut self) {
        self.floors.push(Floor::default());
    }

    /// Close the top floor, handing its items (in insertion order) to the
    /// caller for teardown.
    pub fn pop_floor(&mut self) -> Vec<FloorItem> {
        let floor = self.floors.pop().expect("namespace floor underflow");
        floor.items
    }

    fn top(&mut self) -> &mut Floor {
        self.floors.last_mut().expect("namespace has no floor")
    }

    /// Bind `value` under `name` on the current floor, shadowing any
    /// previous binding.
    pub fn add_value(&mut self, name: &str, value: Value) {
        self.map.entry(name.to_string()).or_default().push(value);
        self.top().items.push(FloorItem::Value {
            name: name.to_string(),
        });
    }

    /// The visible binding for `name`, if any.
    pub fn get_value(&self, name: &str) -> Option<&Value> {
        self.map.get(name).and_then(|stack| stack.last())
    }

    /// Remove and return the newest binding for `name`; used by floor
    /// teardown only.
    pub fn take_value(&mut self, name: &str) -> Option<Value> {
        let stack = self.map.get_mut(name)?;
        let value = stack.pop();
        if stack.is_empty() {
            self.map.remove(name);
        }
        value
    }

    /// Record a combination registered while the current floor is open.
    pub fn add_procedure(&mut self, parent: Type, comb: Comb) {
        self.top().items.push(FloorItem::Procedure { parent, comb });
    }

    /// Register a teardown callback on the current floor.
    pub fn add_callback(&mut self, callback: Teardown) {
        self.top().items.push(FloorItem::Callback(callback));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueKind;

    fn named(name: &str) -> Value {
        let mut v = Value::error();
        v.kind = ValueKind::VarName;
        v.name = Some(name.to_string());
        v
    }

    #[test]
    fn shadowing_restores_on_pop() {
        let mut ns = Namespace::new();
        ns.add_value("a", named("outer"));
        ns.floor_up();
        ns.add_value("a", named("inner"));
        assert_eq!(
            ns.get_value("a").unwrap().name.as_deref(),
            Some("inner")
        );

        for item in ns.pop_floor().into_iter().rev() {
            if let FloorItem::Value { name } = item {
                ns.take_value(&name);
            }
        }
        assert_eq!(
            ns.get_value("a").unwrap().name.as_deref(),
            Some("outer")
        );
        assert_eq!(ns.depth(), 1);
    }

    #[test]
    fn missing_names_are_absent() {
        let ns = Namespace::new();
        assert!(ns.get_value("nope").is_none());
    }
}
