//! Stage Registry for building pipelines from identifiers.
//!
//! Maps textual stage identifiers to constructors taking named parameters.
//! The registry is an ordinary value passed to
//! [`Pipeline::reconfigure`](crate::Pipeline::reconfigure); clones share the
//! same table.

use crate::error::RegistryError;
use crate::stage::{Stage, StageAdapter, Transform};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Create a `StageParams` HashMap with key-value pairs.
///
/// # Example
/// ```
/// use cadenza_core::params;
///
/// let params = params! {
///     "gain" => 0.5,
///     "armed" => true,
/// };
/// assert_eq!(params.len(), 2);
/// ```
#[macro_export]
macro_rules! params {
    ($($key:expr => $value:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut map = $crate::StageParams::new();
        $(
            map.insert($key.to_string(), $value.into());
        )*
        map
    }};
}

/// Function that constructs a stage from parameters
pub type StageConstructor =
    Arc<dyn Fn(&str, &StageParams) -> Result<Box<dyn Stage>, RegistryError> + Send + Sync>;

/// Stage parameters (simple key-value map)
pub type StageParams = HashMap<String, ParamValue>;

/// Parameter value types
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Float(f64),
    Int(i64),
    Bool(bool),
    String(String),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        self.as_f64().map(|f| f as f32)
    }

    /// Integers only; floats are not truncated.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Non-negative integers.
    pub fn as_usize(&self) -> Option<usize> {
        self.as_i64().and_then(|i| usize::try_from(i).ok())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl From<f64> for ParamValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<f32> for ParamValue {
    fn from(f: f32) -> Self {
        Self::Float(f as f64)
    }
}

impl From<i64> for ParamValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for ParamValue {
    fn from(i: i32) -> Self {
        Self::Int(i as i64)
    }
}

impl From<usize> for ParamValue {
    fn from(i: usize) -> Self {
        Self::Int(i as i64)
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

/// One entry of a pipeline description: a registered stage type plus its
/// parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct StageSpec {
    pub id: String,
    pub params: StageParams,
}

impl StageSpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            params: StageParams::new(),
        }
    }

    pub fn with_params(id: impl Into<String>, params: StageParams) -> Self {
        Self {
            id: id.into(),
            params,
        }
    }
}

impl From<&str> for StageSpec {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for StageSpec {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl From<(&str, StageParams)> for StageSpec {
    fn from((id, params): (&str, StageParams)) -> Self {
        Self::with_params(id, params)
    }
}

/// Registry of stage constructors.
pub struct StageRegistry {
    constructors: Arc<RwLock<HashMap<String, StageConstructor>>>,
}

impl StageRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            constructors: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a stage constructor. The first argument passed to the
    /// constructor is the registered type name.
    pub fn register<F>(&self, name: impl Into<String>, constructor: F)
    where
        F: Fn(&str, &StageParams) -> Result<Box<dyn Stage>, RegistryError> + Send + Sync + 'static,
    {
        let name = name.into();
        tracing::debug!(stage_type = %name, "registering stage type");
        self.constructors.write().insert(name, Arc::new(constructor));
    }

    /// Register a [`Transform`] type. `make` builds the transform; its
    /// initial configuration comes from [`Transform::configure`].
    ///
    /// ```
    /// use cadenza_core::{ShapeRejection, SignalShape, StageParams, StageRegistry, Transform};
    /// use cadenza_core::RegistryError;
    ///
    /// struct Pass;
    ///
    /// impl Transform for Pass {
    ///     type Config = ();
    ///
    ///     fn configure(_: &StageParams) -> Result<(), RegistryError> {
    ///         Ok(())
    ///     }
    ///
    ///     fn negotiate(&self, requested: &SignalShape, _: Option<&()>) -> Result<SignalShape, ShapeRejection> {
    ///         Ok(*requested)
    ///     }
    /// }
    ///
    /// let registry = StageRegistry::new();
    /// registry.register_transform("pass", |_| Ok(Pass));
    /// assert!(registry.create(&"pass".into()).is_ok());
    /// ```
    pub fn register_transform<T, F>(&self, name: impl Into<String>, make: F)
    where
        T: Transform,
        F: Fn(&StageParams) -> Result<T, RegistryError> + Send + Sync + 'static,
    {
        self.register(name, move |name: &str, params: &StageParams| {
            let transform = make(params)?;
            let config = T::configure(params)?;
            let stage = StageAdapter::with_config(name, transform, config);
            Ok(Box::new(stage) as Box<dyn Stage>)
        });
    }

    /// Create a stage from a spec.
    pub fn create(&self, spec: &StageSpec) -> Result<Box<dyn Stage>, RegistryError> {
        let constructor = self
            .constructors
            .read()
            .get(&spec.id)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownStageType(spec.id.clone()))?;

        constructor(&spec.id, &spec.params)
    }

    /// List all registered stage types, sorted.
    pub fn list_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.constructors.read().keys().cloned().collect();
        types.sort();
        types
    }

    pub fn has_type(&self, name: &str) -> bool {
        self.constructors.read().contains_key(name)
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.constructors.write().remove(name).is_some()
    }

    pub fn clear(&self) {
        self.constructors.write().clear();
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for StageRegistry {
    fn clone(&self) -> Self {
        Self {
            constructors: Arc::clone(&self.constructors),
        }
    }
}

/// Helper to get a required parameter
pub fn get_param<T>(
    params: &StageParams,
    name: &str,
    convert: impl FnOnce(&ParamValue) -> Option<T>,
) -> Result<T, RegistryError> {
    params
        .get(name)
        .ok_or_else(|| RegistryError::MissingParameter(name.to_string()))
        .and_then(|v| {
            convert(v).ok_or_else(|| {
                RegistryError::InvalidParameter(name.to_string(), format!("{:?}", v))
            })
        })
}

/// Helper to get an optional parameter with default.
///
/// A present value of the wrong type is an error rather than silently
/// falling back to `default`.
pub fn get_param_or<T>(
    params: &StageParams,
    name: &str,
    default: T,
    convert: impl FnOnce(&ParamValue) -> Option<T>,
) -> Result<T, RegistryError> {
    match params.get(name) {
        None => Ok(default),
        Some(v) => convert(v).ok_or_else(|| {
            RegistryError::InvalidParameter(name.to_string(), format!("{:?}", v))
        }),
    }
}
