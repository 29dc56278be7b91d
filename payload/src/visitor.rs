use crate::Value;

pub trait Visitable {
    /// Report every value this object holds on to.
    fn visit_edges(&self, visitor: &mut impl Visitor);
}

pub trait Visitor: Sized {
    fn visit(&mut self, value: Value) {
        let _ = value;
    }
}

// Idea:
// visiting an object means we visit only its direct edges.
// the marker decides whether to follow them.
#[derive(Debug, Default)]
pub(crate) struct Marker {
    pub worklist: Vec<Value>,
}

impl Visitor for Marker {
    #[inline]
    fn visit(&mut self, value: Value) {
        if value.is_reference() {
            self.worklist.push(value);
        }
    }
}
