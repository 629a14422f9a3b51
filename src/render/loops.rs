//! Loop state and the `loop` metadata object.
use std::rc::Rc;

use serde_json::{Map, Value};

use crate::{
    parser::ast::{Expr, Node},
    value,
};

/// The pieces of a for statement a loop needs to re-enter itself when
/// marked recursive.
pub(crate) struct LoopBody {
    pub targets: Vec<String>,
    pub body: Rc<Vec<Node>>,
    pub otherwise: Rc<Vec<Node>>,
    pub filter: Option<Expr>,
    pub recursive: bool,
}

/// State for one active loop.
pub(crate) struct LoopState {
    pub index0: usize,
    pub len: usize,
    pub depth0: usize,
    pub body: Rc<LoopBody>,
    last_changed: Option<Value>,
}

impl LoopState {
    pub fn new(len: usize, depth0: usize, body: Rc<LoopBody>) -> Self {
        Self {
            index0: 0,
            len,
            depth0,
            body,
            last_changed: None,
        }
    }

    /// Build the `loop` object for the current iteration.
    ///
    /// `previtem` and `nextitem` are omitted on the first and last
    /// iteration so they resolve to undefined.
    pub fn object(&self, items: &[Value]) -> Value {
        let i = self.index0;
        let len = self.len;
        let mut map = Map::new();
        map.insert("index".to_string(), Value::from((i + 1) as i64));
        map.insert("index0".to_string(), Value::from(i as i64));
        map.insert("revindex".to_string(), Value::from((len - i) as i64));
        map.insert(
            "revindex0".to_string(),
            Value::from((len - i - 1) as i64),
        );
        map.insert("first".to_string(), Value::Bool(i == 0));
        map.insert("last".to_string(), Value::Bool(i == len - 1));
        map.insert("length".to_string(), Value::from(len as i64));
        map.insert(
            "depth".to_string(),
            Value::from((self.depth0 + 1) as i64),
        );
        map.insert("depth0".to_string(), Value::from(self.depth0 as i64));
        if i > 0 {
            map.insert("previtem".to_string(), items[i - 1].clone());
        }
        if i + 1 < len {
            map.insert("nextitem".to_string(), items[i + 1].clone());
        }
        Value::Object(map)
    }

    /// `loop.cycle(a, b, ...)` selects by iteration index.
    pub fn cycle(&self, args: &[Value]) -> Value {
        args[self.index0 % args.len()].clone()
    }

    /// `loop.changed(x)` is true on the first iteration and whenever
    /// the probe differs from the previous one.
    pub fn changed(&mut self, probe: Value) -> bool {
        match self.last_changed {
            Some(ref prev) if value::eq(prev, &probe) => false,
            _ => {
                self.last_changed = Some(probe);
                true
            }
        }
    }
}
