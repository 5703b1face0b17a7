// Expression Evaluator
// Evaluates AST expressions against an explicit scope, and the engine that maps failures to fallbacks

use crate::config::EngineConfig;
use crate::context::EvaluationContext;
use crate::events::{Diagnostics, EventSender};
use crate::expression::functions::{values_equal, FunctionRegistry};
use crate::expression::parser::{BinaryOp, Expr, ExprParser, UnaryOp};
use crate::pending::Outcome;
use crate::value::Value;

use futures::future::LocalBoxFuture;
use futures::FutureExt;
use indexmap::IndexMap;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

/// Evaluation error
#[derive(Debug, Clone, PartialEq)]
pub struct EvalError {
    pub message: String,
    short_circuit: bool,
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "evaluation error: {}", self.message)
    }
}

impl std::error::Error for EvalError {}

impl EvalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            short_circuit: false,
        }
    }

    /// Raised by a null `?.` receiver and caught by its enclosing chain
    fn short_circuit() -> Self {
        Self {
            message: "optional chain reached null".to_string(),
            short_circuit: true,
        }
    }
}

/// Result of evaluating an expression in tail position
pub enum Evaluated {
    Ready(Value),
    /// An async host function call; failures are still reported as errors
    Deferred(LocalBoxFuture<'static, Result<Value, EvalError>>),
}

impl fmt::Debug for Evaluated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Evaluated::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Evaluated::Deferred(_) => f.write_str("Deferred"),
        }
    }
}

/// Expression evaluator
pub struct Evaluator<'a> {
    context: &'a EvaluationContext<'a>,
    functions: &'a FunctionRegistry,
}

impl<'a> Evaluator<'a> {
    pub fn new(context: &'a EvaluationContext<'a>, functions: &'a FunctionRegistry) -> Self {
        Self { context, functions }
    }

    /// Evaluate an expression whose value is the result of the whole template.
    ///
    /// Only here may an async host function be called: as the expression
    /// itself, or as a branch of a ternary that is itself in tail position.
    pub fn eval_tail(&self, expr: &Expr) -> Result<Evaluated, EvalError> {
        match expr {
            Expr::FunctionCall { name, args } if self.functions.is_async(name) => {
                let args = self.eval_args(args)?;
                Ok(Evaluated::Deferred(self.functions.call_async(name, args)?))
            }

            Expr::Ternary {
                condition,
                then_expr,
                else_expr,
            } => {
                if self.eval(condition)?.is_truthy() {
                    self.eval_tail(then_expr)
                } else {
                    self.eval_tail(else_expr)
                }
            }

            Expr::OptionalChain(inner) => match self.eval_tail(inner) {
                Err(err) if err.short_circuit => Ok(Evaluated::Ready(Value::Null)),
                other => other,
            },

            _ => self.eval(expr).map(Evaluated::Ready),
        }
    }

    /// Evaluate an expression
    pub fn eval(&self, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::Null => Ok(Value::Null),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::String(s) => Ok(Value::String(s.clone())),

            Expr::Identifier(name) => self.context.lookup(name),

            Expr::FunctionCall { name, args } => {
                let args = self.eval_args(args)?;
                self.functions.call(name, args)
            }

            Expr::Index { object, index } => {
                let idx = self.eval(index)?;
                if let (Expr::Identifier(name), Value::String(key)) = (object.as_ref(), &idx) {
                    if let Some(value) = self.context.lookup_key(name, key) {
                        return Ok(value);
                    }
                }
                let obj = self.eval(object)?;
                self.eval_index(&obj, &idx)
            }

            Expr::Member { object, property } => {
                let obj = self.eval(object)?;
                self.eval_member(&obj, property)
            }

            Expr::OptionalGuard(inner) => match self.eval(inner)? {
                Value::Null => Err(EvalError::short_circuit()),
                value => Ok(value),
            },

            Expr::OptionalChain(inner) => match self.eval(inner) {
                Err(err) if err.short_circuit => Ok(Value::Null),
                other => other,
            },

            Expr::Unary { op, expr } => {
                let val = self.eval(expr)?;
                self.eval_unary(*op, &val)
            }

            Expr::Binary { op, left, right } => {
                // Short-circuit operators yield one of their operands
                match op {
                    BinaryOp::And => {
                        let left_val = self.eval(left)?;
                        if !left_val.is_truthy() {
                            return Ok(left_val);
                        }
                        self.eval(right)
                    }
                    BinaryOp::Or => {
                        let left_val = self.eval(left)?;
                        if left_val.is_truthy() {
                            return Ok(left_val);
                        }
                        self.eval(right)
                    }
                    BinaryOp::Nullish => {
                        let left_val = self.eval(left)?;
                        if !left_val.is_null() {
                            return Ok(left_val);
                        }
                        self.eval(right)
                    }
                    _ => {
                        let left_val = self.eval(left)?;
                        let right_val = self.eval(right)?;
                        self.eval_binary(*op, &left_val, &right_val)
                    }
                }
            }

            Expr::Ternary {
                condition,
                then_expr,
                else_expr,
            } => {
                let cond = self.eval(condition)?;
                if cond.is_truthy() {
                    self.eval(then_expr)
                } else {
                    self.eval(else_expr)
                }
            }

            Expr::Array(items) => Ok(Value::Array(self.eval_args(items)?)),

            Expr::Object(pairs) => {
                let mut map = IndexMap::new();
                for (key, value_expr) in pairs {
                    map.insert(key.clone(), self.eval(value_expr)?);
                }
                Ok(Value::Object(map))
            }
        }
    }

    fn eval_args(&self, args: &[Expr]) -> Result<Vec<Value>, EvalError> {
        args.iter().map(|a| self.eval(a)).collect()
    }

    fn eval_index(&self, object: &Value, index: &Value) -> Result<Value, EvalError> {
        match (object, index) {
            (Value::Array(arr), Value::Number(n)) => Ok(array_index(*n)
                .and_then(|i| arr.get(i))
                .cloned()
                .unwrap_or_default()),
            (Value::Array(arr), Value::String(key)) if key == "length" => {
                Ok(Value::Number(arr.len() as f64))
            }
            (Value::Object(map), key @ (Value::String(_) | Value::Number(_))) => {
                Ok(map.get(&key.as_string()).cloned().unwrap_or_default())
            }
            (Value::String(s), Value::Number(n)) => Ok(array_index(*n)
                .and_then(|i| s.chars().nth(i))
                .map(|c| Value::String(c.to_string()))
                .unwrap_or_default()),
            (Value::Null, _) => Err(EvalError::new(format!(
                "cannot read '{}' of null",
                index.as_string()
            ))),
            _ => Err(EvalError::new(format!(
                "cannot index {} with {}",
                object.type_name(),
                index.type_name()
            ))),
        }
    }

    fn eval_member(&self, object: &Value, property: &str) -> Result<Value, EvalError> {
        match object {
            Value::Object(map) => Ok(map.get(property).cloned().unwrap_or_default()),
            Value::Array(arr) if property == "length" => Ok(Value::Number(arr.len() as f64)),
            Value::String(s) if property == "length" => {
                Ok(Value::Number(s.chars().count() as f64))
            }
            Value::Null => Err(EvalError::new(format!(
                "cannot read property '{}' of null",
                property
            ))),
            _ => Err(EvalError::new(format!(
                "cannot access property '{}' on {}",
                property,
                object.type_name()
            ))),
        }
    }

    fn eval_unary(&self, op: UnaryOp, value: &Value) -> Result<Value, EvalError> {
        match op {
            UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
            UnaryOp::Neg => to_number(value)
                .map(|n| Value::Number(-n))
                .ok_or_else(|| EvalError::new(format!("cannot negate {}", value.type_name()))),
        }
    }

    fn eval_binary(&self, op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
        match op {
            // Arithmetic
            BinaryOp::Add => self.eval_add(left, right),
            BinaryOp::Sub => self.eval_numeric_op(op, left, right, |a, b| a - b),
            BinaryOp::Mul => self.eval_numeric_op(op, left, right, |a, b| a * b),
            BinaryOp::Div => self.eval_numeric_op(op, left, right, |a, b| a / b),
            BinaryOp::Mod => self.eval_numeric_op(op, left, right, |a, b| a % b),

            // Comparison
            BinaryOp::Eq => Ok(Value::Bool(values_equal(left, right))),
            BinaryOp::Ne => Ok(Value::Bool(!values_equal(left, right))),
            BinaryOp::Lt => self.eval_comparison(op, left, right, |o| o.is_lt()),
            BinaryOp::Le => self.eval_comparison(op, left, right, |o| o.is_le()),
            BinaryOp::Gt => self.eval_comparison(op, left, right, |o| o.is_gt()),
            BinaryOp::Ge => self.eval_comparison(op, left, right, |o| o.is_ge()),

            // Handled in eval() for short-circuit
            BinaryOp::And | BinaryOp::Or | BinaryOp::Nullish => {
                Err(EvalError::new(format!("operator {} cannot be applied here", op)))
            }
        }
    }

    fn eval_add(&self, left: &Value, right: &Value) -> Result<Value, EvalError> {
        match (left, right) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
            (Value::String(_) | Value::Array(_) | Value::Object(_), _)
            | (_, Value::String(_) | Value::Array(_) | Value::Object(_)) => Ok(Value::String(
                format!("{}{}", left.as_string(), right.as_string()),
            )),
            _ => self.eval_numeric_op(BinaryOp::Add, left, right, |a, b| a + b),
        }
    }

    fn eval_numeric_op<F>(
        &self,
        op: BinaryOp,
        left: &Value,
        right: &Value,
        apply: F,
    ) -> Result<Value, EvalError>
    where
        F: FnOnce(f64, f64) -> f64,
    {
        match (to_number(left), to_number(right)) {
            (Some(a), Some(b)) => Ok(Value::Number(apply(a, b))),
            _ => Err(EvalError::new(format!(
                "operator {} requires numbers, got {} and {}",
                op,
                left.type_name(),
                right.type_name()
            ))),
        }
    }

    fn eval_comparison<F>(
        &self,
        op: BinaryOp,
        left: &Value,
        right: &Value,
        test: F,
    ) -> Result<Value, EvalError>
    where
        F: FnOnce(std::cmp::Ordering) -> bool,
    {
        let ordering = match (left, right) {
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => match (to_number(left), to_number(right)) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => {
                    return Err(EvalError::new(format!(
                        "operator {} cannot compare {} and {}",
                        op,
                        left.type_name(),
                        right.type_name()
                    )))
                }
            },
        };

        // Comparisons involving NaN are false
        Ok(Value::Bool(ordering.is_some_and(test)))
    }
}

/// Numeric view of an operand; null counts as zero
fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Null => Some(0.0),
        other => other.as_number(),
    }
}

fn array_index(n: f64) -> Option<usize> {
    (n >= 0.0 && n.fract() == 0.0).then_some(n as usize)
}

/// High-level expression engine.
///
/// Owns the function registry and the fallback policy: every failure, sync or
/// async, is reported to the diagnostics sink and replaced by a fallback value,
/// never returned to the caller.
#[derive(Debug, Clone, Default)]
pub struct ExpressionEngine {
    config: EngineConfig,
    functions: Rc<FunctionRegistry>,
    diagnostics: Diagnostics,
}

impl ExpressionEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            functions: Rc::new(FunctionRegistry::new()),
            diagnostics: Diagnostics::default(),
        }
    }

    /// Register a synchronous host function
    pub fn with_function<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value, EvalError> + 'static,
    {
        Rc::make_mut(&mut self.functions).register(name, f);
        self
    }

    /// Register an asynchronous host function
    pub fn with_async_function<F, Fut>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + 'static,
        Fut: Future<Output = Result<Value, EvalError>> + 'static,
    {
        Rc::make_mut(&mut self.functions).register_async(name, f);
        self
    }

    /// Send evaluation events to `sender` in addition to the log
    pub fn with_events(mut self, sender: EventSender) -> Self {
        self.diagnostics = Diagnostics::new(Some(sender));
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Parse and evaluate, reporting errors to the caller
    pub fn try_evaluate(
        &self,
        source: &str,
        context: &EvaluationContext<'_>,
    ) -> Result<Evaluated, EvalError> {
        let ast = ExprParser::parse_str(source)
            .map_err(|e| EvalError::new(format!("parse error: {}", e)))?;

        Evaluator::new(context, &self.functions).eval_tail(&ast)
    }

    /// Evaluate, falling back to the configured error sentinel
    pub fn evaluate(&self, source: &str, context: &EvaluationContext<'_>) -> Outcome<Value> {
        self.evaluate_or(source, context, self.config.error_sentinel.clone())
    }

    /// Evaluate, falling back to `fallback` when the expression fails or its
    /// pending result rejects
    pub fn evaluate_or(
        &self,
        source: &str,
        context: &EvaluationContext<'_>,
        fallback: Value,
    ) -> Outcome<Value> {
        match self.try_evaluate(source, context) {
            Ok(Evaluated::Ready(value)) => Outcome::Ready(value),
            Ok(Evaluated::Deferred(fut)) => {
                let diagnostics = self.diagnostics.clone();
                let source = source.to_string();
                Outcome::Pending(
                    async move {
                        match fut.await {
                            Ok(value) => value,
                            Err(err) => {
                                diagnostics.expression_failed(&source, &err);
                                fallback
                            }
                        }
                    }
                    .boxed_local(),
                )
            }
            Err(err) => {
                self.diagnostics.expression_failed(source, &err);
                Outcome::Ready(fallback)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::HostState;
    use crate::events::{event_channel, EvaluationEvent};
    use crate::pending::Partial;
    use crate::variables::{Tier, VariableEnvironment};

    fn make_host() -> HostState {
        let states = IndexMap::from([
            ("light.kitchen".to_string(), Value::from("on")),
            (
                "sensor.temp".to_string(),
                Value::from_iter([("state", Value::from("21.5"))]),
            ),
        ]);
        HostState::new(states).with_user(Value::from_iter([("name", "Ada")]))
    }

    fn make_engine() -> ExpressionEngine {
        ExpressionEngine::new(EngineConfig::default())
            .with_async_function("later", |args| async move {
                Ok(args.into_iter().next().unwrap_or_default())
            })
            .with_async_function("fail", |_| async move { Err(EvalError::new("rejected")) })
    }

    fn eval(source: &str) -> Value {
        let host = make_host();
        let ctx = EvaluationContext::new(&host);
        make_engine()
            .evaluate(source, &ctx)
            .ready()
            .expect("expression should be synchronous")
    }

    #[test]
    fn test_eval_literals() {
        assert_eq!(eval("null"), Value::Null);
        assert_eq!(eval("undefined"), Value::Null);
        assert_eq!(eval("true"), Value::Bool(true));
        assert_eq!(eval("42"), Value::Number(42.0));
        assert_eq!(eval("'hello'"), Value::from("hello"));
        assert_eq!(eval("[1, 'a']"), Value::from(vec![Value::Number(1.0), Value::from("a")]));
        assert_eq!(
            eval("{ icon: 'mdi:lamp' }"),
            Value::from_iter([("icon", "mdi:lamp")])
        );
    }

    #[test]
    fn test_eval_arithmetic() {
        assert_eq!(eval("1 + 2 * 3"), Value::Number(7.0));
        assert_eq!(eval("(1 + 2) * 3"), Value::Number(9.0));
        assert_eq!(eval("7 % 4"), Value::Number(3.0));
        assert_eq!(eval("-2 + 1"), Value::Number(-1.0));
        assert_eq!(eval("'t=' + 21"), Value::from("t=21"));
    }

    #[test]
    fn test_eval_state_lookup() {
        assert_eq!(eval("states['light.kitchen']"), Value::from("on"));
        assert_eq!(eval("states['sensor.temp'].state"), Value::from("21.5"));
        assert_eq!(eval("hass.states['light.kitchen']"), Value::from("on"));
        assert_eq!(eval("user.name"), Value::from("Ada"));
        assert_eq!(eval("states['sensor.temp'].state * 2"), Value::Number(43.0));
    }

    #[test]
    fn test_eval_comparison() {
        assert_eq!(eval("states['light.kitchen'] === 'on'"), Value::Bool(true));
        assert_eq!(eval("states['light.kitchen'] != 'on'"), Value::Bool(false));
        assert_eq!(eval("states['sensor.temp'].state > 20"), Value::Bool(true));
        assert_eq!(eval("'a' < 'b'"), Value::Bool(true));
    }

    #[test]
    fn test_eval_logical_returns_operands() {
        assert_eq!(eval("null || 'fallback'"), Value::from("fallback"));
        assert_eq!(eval("'x' && 'y'"), Value::from("y"));
        assert_eq!(eval("0 && 'y'"), Value::Number(0.0));
        assert_eq!(eval("null ?? 'z'"), Value::from("z"));
        assert_eq!(eval("0 ?? 'z'"), Value::Number(0.0));
        assert_eq!(eval("!false"), Value::Bool(true));
    }

    #[test]
    fn test_eval_optional_member() {
        assert_eq!(eval("states['light.missing']?.state"), Value::Null);
        // Without ?. the same read is an error, mapped to the sentinel
        assert_eq!(eval("states['light.missing'].state"), Value::Null);
    }

    #[test]
    fn test_optional_chain_short_circuits_rest_of_chain() {
        let host = make_host();
        let ctx = EvaluationContext::new(&host);
        let engine = ExpressionEngine::new(EngineConfig::default());

        let ok = |source: &str| match engine.try_evaluate(source, &ctx) {
            Ok(Evaluated::Ready(value)) => value,
            other => panic!("'{}' should evaluate, got {:?}", source, other),
        };
        assert_eq!(ok("states['light.missing']?.attributes.name"), Value::Null);
        assert_eq!(ok("states['light.missing']?.attributes['x'].y"), Value::Null);
        assert_eq!(ok("states['light.missing']?.toUpperCase()"), Value::Null);
        assert_eq!(ok("user?.name.toUpperCase()"), Value::from("ADA"));
        assert_eq!(ok("(states['light.missing']?.x) ?? 'none'"), Value::from("none"));

        // The guard only covers what follows it
        assert!(engine
            .try_evaluate("states['light.missing'].attributes?.name", &ctx)
            .is_err());
        assert!(engine
            .try_evaluate("(states['light.missing']?.x).y", &ctx)
            .is_err());
    }

    #[test]
    fn test_eval_ternary_and_methods() {
        assert_eq!(
            eval("states['light.kitchen'] == 'on' ? 'mdi:lightbulb-on' : 'mdi:lightbulb'"),
            Value::from("mdi:lightbulb-on")
        );
        assert_eq!(eval("user.name.toUpperCase()"), Value::from("ADA"));
        assert_eq!(eval("'a,b'.split(',').length"), Value::Number(2.0));
    }

    #[test]
    fn test_failed_expression_reports_and_uses_sentinel() {
        let (tx, mut rx) = event_channel();
        let engine = ExpressionEngine::new(EngineConfig {
            error_sentinel: Value::from("n/a"),
            ..EngineConfig::default()
        })
        .with_events(tx);
        let host = make_host();
        let ctx = EvaluationContext::new(&host);

        assert_eq!(
            engine.evaluate("missing + 1", &ctx).ready(),
            Some(Value::from("n/a"))
        );
        assert_eq!(
            engine.evaluate_or("1 +", &ctx, Value::from("<error>")).ready(),
            Some(Value::from("<error>"))
        );

        assert!(matches!(
            rx.try_recv().unwrap(),
            EvaluationEvent::ExpressionFailed { ref expression, .. } if expression == "missing + 1"
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            EvaluationEvent::ExpressionFailed { .. }
        ));
    }

    #[test]
    fn test_evaluation_does_not_touch_scope() {
        let host = make_host();
        let mut dynamics = VariableEnvironment::new(Tier::Dynamic);
        dynamics.insert_named("level", Partial::Ready(Value::Number(3.0)));
        let ctx = EvaluationContext::new(&host).with_dynamics(&dynamics);
        let engine = make_engine();

        // Assignment is not part of the grammar
        assert_eq!(engine.evaluate("level = 5", &ctx).ready(), Some(Value::Null));
        // A failing evaluation in between leaves the scope as it was
        assert_eq!(engine.evaluate("nope.x", &ctx).ready(), Some(Value::Null));
        assert_eq!(
            engine.evaluate("level + 1", &ctx).ready(),
            Some(Value::Number(4.0))
        );
        assert_eq!(host, make_host());
    }

    #[test]
    fn test_pending_variable_read_is_error() {
        let host = make_host();
        let mut dynamics = VariableEnvironment::new(Tier::Dynamic);
        let never = futures::future::pending::<Value>().boxed_local().shared();
        dynamics.insert_named("slow", Partial::pending(never));
        let ctx = EvaluationContext::new(&host).with_dynamics(&dynamics);

        let err = make_engine()
            .try_evaluate("slow", &ctx)
            .unwrap_err();
        assert!(err.message.contains("still pending"));
    }

    #[tokio::test]
    async fn test_async_function_in_tail_position() {
        let host = make_host();
        let ctx = EvaluationContext::new(&host);
        let engine = make_engine();

        let outcome = engine.evaluate("later(5)", &ctx);
        assert!(outcome.is_pending());
        assert_eq!(outcome.settle().await, Value::Number(5.0));

        let outcome = engine.evaluate("user.name == 'Ada' ? later('yes') : 'no'", &ctx);
        assert!(outcome.is_pending());
        assert_eq!(outcome.settle().await, Value::from("yes"));

        let outcome = engine.evaluate("false ? later('yes') : 'no'", &ctx);
        assert_eq!(outcome.ready(), Some(Value::from("no")));
    }

    #[tokio::test]
    async fn test_async_function_outside_tail_position() {
        let host = make_host();
        let ctx = EvaluationContext::new(&host);

        let outcome = make_engine().evaluate("later(1) + 1", &ctx);
        assert_eq!(outcome.ready(), Some(Value::Null));
    }

    #[tokio::test]
    async fn test_rejected_future_maps_to_sentinel() {
        let (tx, mut rx) = event_channel();
        let engine = make_engine().with_events(tx);
        let host = make_host();
        let ctx = EvaluationContext::new(&host);

        let outcome = engine.evaluate_or("fail()", &ctx, Value::from("fallback"));
        assert!(rx.try_recv().is_err());
        assert_eq!(outcome.settle().await, Value::from("fallback"));
        assert!(matches!(
            rx.try_recv().unwrap(),
            EvaluationEvent::ExpressionFailed { ref message, .. } if message == "rejected"
        ));
    }
}
