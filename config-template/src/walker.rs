// Structural Walker
// Rewrites a configuration tree, replacing every embedded expression by its value

use crate::context::{EvaluationContext, OutputSlot};
use crate::expression::lexer::{classify, Segment, TemplateKind};
use crate::expression::ExpressionEngine;
use crate::pending::{Outcome, Partial, PathSegment, PendingSet};
use crate::value::Value;

use futures::future::{self, LocalBoxFuture};
use futures::FutureExt;
use std::cell::RefCell;
use std::rc::Rc;

/// How a string without delimiters is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateMode {
    /// Plain text stays text
    Structure,
    /// Variable values: the whole string is one bare expression
    Declaration,
}

/// Evaluate one string according to the delimiter rules
pub fn evaluate_template(
    engine: &ExpressionEngine,
    template: &str,
    mode: TemplateMode,
    context: &EvaluationContext<'_>,
) -> Outcome<Value> {
    match classify(template) {
        TemplateKind::Literal(rest) => Outcome::Ready(Value::String(rest)),
        // Raw result, keeping its type
        TemplateKind::Whole(source) => engine.evaluate(&source, context),
        TemplateKind::Interpolated(segments) => interpolate(engine, segments, context),
        TemplateKind::Plain => match mode {
            TemplateMode::Structure => Outcome::Ready(Value::String(template.to_string())),
            TemplateMode::Declaration => engine.evaluate(template, context),
        },
    }
}

fn interpolate(
    engine: &ExpressionEngine,
    segments: Vec<Segment>,
    context: &EvaluationContext<'_>,
) -> Outcome<Value> {
    let fallback = Value::String(engine.config().interpolation_error.clone());

    let parts: Vec<Outcome<Value>> = segments
        .into_iter()
        .map(|segment| match segment {
            Segment::Text(text) => Outcome::Ready(Value::String(text)),
            Segment::Expr(source) => engine.evaluate_or(&source, context, fallback.clone()),
        })
        .collect();

    if !parts.iter().any(Outcome::is_pending) {
        return Outcome::Ready(concat(parts.into_iter().filter_map(Outcome::ready)));
    }

    Outcome::Pending(
        async move {
            let values = future::join_all(parts.into_iter().map(Outcome::into_future)).await;
            concat(values.into_iter())
        }
        .boxed_local(),
    )
}

fn concat(parts: impl Iterator<Item = Value>) -> Value {
    Value::String(parts.map(|part| part.as_string()).collect())
}

/// Result of one walk: the eagerly built tree plus the work still in flight
pub struct Walk {
    tree: OutputSlot,
    pending: PendingSet,
}

impl Walk {
    /// Current shape, pending leaves read as null
    pub fn snapshot(&self) -> Value {
        self.tree.borrow().to_value()
    }

    /// Current shape with pending leaves kept as such
    pub fn partial(&self) -> Partial {
        self.tree.borrow().clone()
    }

    pub fn is_settled(&self) -> bool {
        self.tree.borrow().is_settled()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Wait for every pending leaf, then return the fully resolved tree
    pub fn settle(self) -> LocalBoxFuture<'static, Value> {
        let Walk { tree, pending } = self;
        async move {
            pending.settle().await;
            let value = tree.borrow().to_value();
            value
        }
        .boxed_local()
    }

    pub fn into_outcome(self) -> Outcome<Value> {
        if self.pending.is_empty() {
            Outcome::Ready(self.snapshot())
        } else {
            Outcome::Pending(self.settle())
        }
    }

    fn patch(&mut self, path: &[PathSegment], outcome: Outcome<Value>) {
        match outcome {
            Outcome::Ready(value) => {
                self.tree.borrow_mut().set(path, Partial::Ready(value));
            }
            Outcome::Pending(fut) => {
                let shared = fut.shared();
                self.tree
                    .borrow_mut()
                    .set(path, Partial::pending(shared.clone()));

                let tree = Rc::clone(&self.tree);
                let path = path.to_vec();
                self.pending.track(async move {
                    let value = shared.await;
                    tree.borrow_mut().set(&path, Partial::Ready(value));
                });
            }
        }
    }
}

/// Walks configuration trees against one evaluation context
pub struct StructureWalker<'a> {
    engine: &'a ExpressionEngine,
    context: EvaluationContext<'a>,
}

impl<'a> StructureWalker<'a> {
    pub fn new(engine: &'a ExpressionEngine, context: EvaluationContext<'a>) -> Self {
        Self { engine, context }
    }

    /// Walk `tree` without touching it.
    ///
    /// The result starts as a copy of the input and each string leaf is
    /// replaced as soon as it is evaluated, so later expressions can read
    /// earlier results through `output`.
    pub fn walk(&self, tree: &Value) -> Walk {
        let slot: OutputSlot = Rc::new(RefCell::new(Partial::from_value(tree)));
        let context = self.context.clone().with_output(Rc::clone(&slot));

        let mut walk = Walk {
            tree: slot,
            pending: PendingSet::new(),
        };
        let mut path = Vec::new();
        self.visit(tree, &mut path, &context, &mut walk);

        tracing::trace!(pending = walk.pending_count(), "walked structure");
        walk
    }

    fn visit(
        &self,
        value: &Value,
        path: &mut Vec<PathSegment>,
        context: &EvaluationContext<'_>,
        walk: &mut Walk,
    ) {
        match value {
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    path.push(PathSegment::Index(i));
                    self.visit(item, path, context, walk);
                    path.pop();
                }
            }
            Value::Object(map) => {
                for (key, item) in map {
                    path.push(PathSegment::Key(key.clone()));
                    self.visit(item, path, context, walk);
                    path.pop();
                }
            }
            Value::String(template) => {
                let outcome =
                    evaluate_template(self.engine, template, TemplateMode::Structure, context);
                walk.patch(path, outcome);
            }
            // Other scalars were already copied into the tree
            _ => {}
        }
    }
}

/// Walk `tree` and return the result, pending if any leaf is
pub fn evaluate_structure(
    engine: &ExpressionEngine,
    tree: &Value,
    context: &EvaluationContext<'_>,
) -> Outcome<Value> {
    StructureWalker::new(engine, context.clone())
        .walk(tree)
        .into_outcome()
}
