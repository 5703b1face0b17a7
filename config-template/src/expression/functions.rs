// Built-in and Host Functions
// Function library available to template expressions, plus host-registered extensions

use crate::expression::evaluator::EvalError;
use crate::value::Value;

use futures::future::LocalBoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::rc::Rc;

/// Synchronous host function
pub type HostFn = Rc<dyn Fn(Vec<Value>) -> Result<Value, EvalError>>;

/// Asynchronous host function; its future is the pending result of the expression
pub type AsyncHostFn = Rc<dyn Fn(Vec<Value>) -> LocalBoxFuture<'static, Result<Value, EvalError>>>;

/// Registry of built-in functions
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinFunctions;

impl BuiltinFunctions {
    pub fn new() -> Self {
        Self
    }

    /// Call a built-in function
    pub fn call(&self, name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
        match name.to_lowercase().as_str() {
            // String functions
            "contains" => self.fn_contains(args),
            "startswith" => self.fn_startswith(args),
            "endswith" => self.fn_endswith(args),
            "format" => self.fn_format(args),
            "join" => self.fn_join(args),
            "replace" => self.fn_replace(args),
            "split" => self.fn_split(args),
            "lower" | "tolowercase" => self.fn_lower(args),
            "upper" | "touppercase" => self.fn_upper(args),
            "trim" => self.fn_trim(args),

            // Conversion functions
            "tojson" => self.fn_to_json(args),
            "number" => self.fn_number(args),
            "string" => self.fn_string(args),

            // Math functions
            "round" => self.fn_round(args),
            "floor" => self.fn_unary_math(args, "floor", f64::floor),
            "ceil" => self.fn_unary_math(args, "ceil", f64::ceil),
            "abs" => self.fn_unary_math(args, "abs", f64::abs),
            "min" => self.fn_extremum(args, "min", f64::min),
            "max" => self.fn_extremum(args, "max", f64::max),

            // Collection functions
            "keys" => self.fn_keys(args),
            "values" => self.fn_values(args),
            "in" => self.fn_in(args),

            // Utility functions
            "coalesce" => self.fn_coalesce(args),
            "iif" => self.fn_iif(args),
            "length" => self.fn_length(args),

            _ => Err(EvalError::new(format!("unknown function: {}", name))),
        }
    }

    // =========================================================================
    // String Functions
    // =========================================================================

    fn fn_contains(&self, args: Vec<Value>) -> Result<Value, EvalError> {
        self.require_args(&args, 2, "contains")?;

        match (&args[0], &args[1]) {
            (Value::String(haystack), needle) => {
                Ok(Value::Bool(haystack.contains(&needle.as_string())))
            }
            (Value::Array(arr), needle) => Ok(Value::Bool(
                arr.iter().any(|item| values_equal(item, needle)),
            )),
            (Value::Object(map), key) => Ok(Value::Bool(map.contains_key(&key.as_string()))),
            _ => Err(EvalError::new("contains() requires string, array, or object")),
        }
    }

    fn fn_startswith(&self, args: Vec<Value>) -> Result<Value, EvalError> {
        self.require_args(&args, 2, "startsWith")?;
        let s = args[0].as_string();
        let prefix = args[1].as_string();
        Ok(Value::Bool(s.starts_with(&prefix)))
    }

    fn fn_endswith(&self, args: Vec<Value>) -> Result<Value, EvalError> {
        self.require_args(&args, 2, "endsWith")?;
        let s = args[0].as_string();
        let suffix = args[1].as_string();
        Ok(Value::Bool(s.ends_with(&suffix)))
    }

    fn fn_format(&self, args: Vec<Value>) -> Result<Value, EvalError> {
        if args.is_empty() {
            return Err(EvalError::new("format() requires at least 1 argument"));
        }

        let mut result = args[0].as_string();

        // Replace {0}, {1}, etc. with arguments
        for (i, arg) in args.iter().skip(1).enumerate() {
            let placeholder = format!("{{{}}}", i);
            result = result.replace(&placeholder, &arg.as_string());
        }

        Ok(Value::String(result))
    }

    fn fn_join(&self, args: Vec<Value>) -> Result<Value, EvalError> {
        if args.is_empty() || args.len() > 2 {
            return Err(EvalError::new("join() requires 1 or 2 arguments"));
        }

        let separator = args.get(1).map(Value::as_string).unwrap_or_else(|| ",".to_string());

        match &args[0] {
            Value::Array(arr) => {
                let strings: Vec<String> = arr.iter().map(Value::as_string).collect();
                Ok(Value::String(strings.join(&separator)))
            }
            _ => Err(EvalError::new("join() requires array as first argument")),
        }
    }

    fn fn_replace(&self, args: Vec<Value>) -> Result<Value, EvalError> {
        self.require_args(&args, 3, "replace")?;
        let s = args[0].as_string();
        let from = args[1].as_string();
        let to = args[2].as_string();
        Ok(Value::String(s.replace(&from, &to)))
    }

    fn fn_split(&self, args: Vec<Value>) -> Result<Value, EvalError> {
        self.require_args(&args, 2, "split")?;
        let s = args[0].as_string();
        let delimiter = args[1].as_string();
        let parts: Vec<Value> = s
            .split(delimiter.as_str())
            .map(|p| Value::String(p.to_string()))
            .collect();
        Ok(Value::Array(parts))
    }

    fn fn_lower(&self, args: Vec<Value>) -> Result<Value, EvalError> {
        self.require_args(&args, 1, "lower")?;
        Ok(Value::String(args[0].as_string().to_lowercase()))
    }

    fn fn_upper(&self, args: Vec<Value>) -> Result<Value, EvalError> {
        self.require_args(&args, 1, "upper")?;
        Ok(Value::String(args[0].as_string().to_uppercase()))
    }

    fn fn_trim(&self, args: Vec<Value>) -> Result<Value, EvalError> {
        self.require_args(&args, 1, "trim")?;
        Ok(Value::String(args[0].as_string().trim().to_string()))
    }

    // =========================================================================
    // Conversion Functions
    // =========================================================================

    fn fn_to_json(&self, args: Vec<Value>) -> Result<Value, EvalError> {
        self.require_args(&args, 1, "toJson")?;
        Ok(Value::String(args[0].to_json()))
    }

    fn fn_number(&self, args: Vec<Value>) -> Result<Value, EvalError> {
        self.require_args(&args, 1, "number")?;
        Ok(Value::Number(args[0].as_number().unwrap_or(f64::NAN)))
    }

    fn fn_string(&self, args: Vec<Value>) -> Result<Value, EvalError> {
        self.require_args(&args, 1, "string")?;
        Ok(Value::String(args[0].as_string()))
    }

    // =========================================================================
    // Math Functions
    // =========================================================================

    fn fn_round(&self, args: Vec<Value>) -> Result<Value, EvalError> {
        if args.is_empty() || args.len() > 2 {
            return Err(EvalError::new("round() requires 1 or 2 arguments"));
        }

        let n = self.number_arg(&args[0], "round")?;
        let digits = match args.get(1) {
            Some(d) => self.number_arg(d, "round")?.trunc() as i32,
            None => 0,
        };

        let factor = 10f64.powi(digits);
        Ok(Value::Number((n * factor).round() / factor))
    }

    fn fn_unary_math(
        &self,
        args: Vec<Value>,
        name: &str,
        op: fn(f64) -> f64,
    ) -> Result<Value, EvalError> {
        self.require_args(&args, 1, name)?;
        Ok(Value::Number(op(self.number_arg(&args[0], name)?)))
    }

    fn fn_extremum(
        &self,
        args: Vec<Value>,
        name: &str,
        pick: fn(f64, f64) -> f64,
    ) -> Result<Value, EvalError> {
        // min([1, 2]) and min(1, 2) are both accepted
        let items = match args.as_slice() {
            [Value::Array(items)] => items.clone(),
            _ => args,
        };

        let mut numbers = items.iter().map(|v| self.number_arg(v, name));
        let first = numbers
            .next()
            .ok_or_else(|| EvalError::new(format!("{}() requires at least 1 argument", name)))??;

        numbers
            .try_fold(first, |acc, n: Result<f64, EvalError>| -> Result<f64, EvalError> {
                Ok(pick(acc, n?))
            })
            .map(Value::Number)
    }

    // =========================================================================
    // Collection Functions
    // =========================================================================

    fn fn_keys(&self, args: Vec<Value>) -> Result<Value, EvalError> {
        self.require_args(&args, 1, "keys")?;
        match &args[0] {
            Value::Object(map) => Ok(Value::Array(
                map.keys().map(|k| Value::String(k.clone())).collect(),
            )),
            Value::Array(arr) => Ok(Value::Array(
                (0..arr.len()).map(|i| Value::Number(i as f64)).collect(),
            )),
            _ => Err(EvalError::new("keys() requires object or array")),
        }
    }

    fn fn_values(&self, args: Vec<Value>) -> Result<Value, EvalError> {
        self.require_args(&args, 1, "values")?;
        match &args[0] {
            Value::Object(map) => Ok(Value::Array(map.values().cloned().collect())),
            Value::Array(arr) => Ok(Value::Array(arr.clone())),
            _ => Err(EvalError::new("values() requires object or array")),
        }
    }

    fn fn_in(&self, args: Vec<Value>) -> Result<Value, EvalError> {
        if args.len() < 2 {
            return Err(EvalError::new("in() requires at least 2 arguments"));
        }
        let needle = &args[0];
        Ok(Value::Bool(args[1..].iter().any(|arg| values_equal(needle, arg))))
    }

    // =========================================================================
    // Utility Functions
    // =========================================================================

    fn fn_coalesce(&self, args: Vec<Value>) -> Result<Value, EvalError> {
        for arg in args {
            match &arg {
                Value::Null => continue,
                Value::String(s) if s.is_empty() => continue,
                _ => return Ok(arg),
            }
        }
        Ok(Value::Null)
    }

    fn fn_iif(&self, args: Vec<Value>) -> Result<Value, EvalError> {
        self.require_args(&args, 3, "iif")?;
        let mut args = args.into_iter();
        let (Some(condition), Some(then), Some(otherwise)) = (args.next(), args.next(), args.next())
        else {
            return Err(EvalError::new("iif() requires 3 argument(s)"));
        };
        Ok(if condition.is_truthy() { then } else { otherwise })
    }

    fn fn_length(&self, args: Vec<Value>) -> Result<Value, EvalError> {
        self.require_args(&args, 1, "length")?;
        match &args[0] {
            Value::String(s) => Ok(Value::Number(s.chars().count() as f64)),
            Value::Array(arr) => Ok(Value::Number(arr.len() as f64)),
            Value::Object(obj) => Ok(Value::Number(obj.len() as f64)),
            _ => Err(EvalError::new("length() requires string, array, or object")),
        }
    }

    // =========================================================================
    // Helper Functions
    // =========================================================================

    fn require_args(&self, args: &[Value], count: usize, name: &str) -> Result<(), EvalError> {
        if args.len() != count {
            return Err(EvalError::new(format!(
                "{}() requires {} argument(s), got {}",
                name,
                count,
                args.len()
            )));
        }
        Ok(())
    }

    fn number_arg(&self, value: &Value, name: &str) -> Result<f64, EvalError> {
        value.as_number().ok_or_else(|| {
            EvalError::new(format!(
                "{}() requires numeric arguments, got {}",
                name,
                value.type_name()
            ))
        })
    }
}

/// Loose equality used by `==`, `in()` and `contains()`.
///
/// Numbers and numeric strings compare by value, booleans compare against
/// "true"/"false", arrays and objects compare element-wise.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        // Coerce for comparison
        (Value::Number(a), Value::String(b)) | (Value::String(b), Value::Number(a)) => b
            .trim()
            .parse::<f64>()
            .map(|n| *a == n)
            .unwrap_or(false),
        (Value::Bool(a), Value::String(b)) | (Value::String(b), Value::Bool(a)) => {
            (*a && b == "true") || (!*a && b == "false")
        }
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(k, v)| b.get(k).is_some_and(|other| values_equal(v, other)))
        }
        _ => false,
    }
}

/// Built-ins plus functions registered by the host application.
///
/// Host functions shadow built-ins of the same name. Names are matched
/// case-insensitively, like the built-ins.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    builtins: BuiltinFunctions,
    sync_fns: HashMap<String, HostFn>,
    async_fns: HashMap<String, AsyncHostFn>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: &str, f: F)
    where
        F: Fn(Vec<Value>) -> Result<Value, EvalError> + 'static,
    {
        let key = name.to_lowercase();
        self.async_fns.remove(&key);
        self.sync_fns.insert(key, Rc::new(f));
    }

    pub fn register_async<F, Fut>(&mut self, name: &str, f: F)
    where
        F: Fn(Vec<Value>) -> Fut + 'static,
        Fut: Future<Output = Result<Value, EvalError>> + 'static,
    {
        let key = name.to_lowercase();
        self.sync_fns.remove(&key);
        self.async_fns
            .insert(key, Rc::new(move |args| f(args).boxed_local()));
    }

    pub fn is_async(&self, name: &str) -> bool {
        self.async_fns.contains_key(&name.to_lowercase())
    }

    /// Call a synchronous function
    pub fn call(&self, name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
        let key = name.to_lowercase();
        if let Some(f) = self.sync_fns.get(&key) {
            return f(args);
        }
        if self.async_fns.contains_key(&key) {
            return Err(EvalError::new(format!(
                "async function {}() must be the whole expression or a ternary branch",
                name
            )));
        }
        self.builtins.call(name, args)
    }

    /// Start an asynchronous function call
    pub fn call_async(
        &self,
        name: &str,
        args: Vec<Value>,
    ) -> Result<LocalBoxFuture<'static, Result<Value, EvalError>>, EvalError> {
        self.async_fns
            .get(&name.to_lowercase())
            .map(|f| f(args))
            .ok_or_else(|| EvalError::new(format!("unknown async function: {}", name)))
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("sync_fns", &self.sync_fns.keys().collect::<Vec<_>>())
            .field("async_fns", &self.async_fns.keys().collect::<Vec<_>>())
            .finish()
    }
}
