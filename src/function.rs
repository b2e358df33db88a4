//! Scalar function descriptors and the function registry.
//!
//! A [`ScalarFunction`] is the bound signature of a function call inside an
//! expression. Implementations live in a [`FunctionRegistry`] and are looked
//! up by name when an expression is executed.

use crate::error::{GeoscanError, Result};
use crate::types::{LogicalType, Value};
use geo::{Contains, Intersects};
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// Whether repeated calls with the same arguments may return different
/// results or mutate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FunctionSideEffects {
    #[default]
    NoSideEffects,
    HasSideEffects,
}

/// Bound signature of a scalar function.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScalarFunction {
    pub name: String,
    pub arguments: Vec<LogicalType>,
    pub return_type: LogicalType,
    pub side_effects: FunctionSideEffects,
}

impl ScalarFunction {
    pub fn new(
        name: impl Into<String>,
        arguments: Vec<LogicalType>,
        return_type: LogicalType,
    ) -> Self {
        Self {
            name: name.into(),
            arguments,
            return_type,
            side_effects: FunctionSideEffects::NoSideEffects,
        }
    }

    /// Mark the function as volatile (e.g. `random()`).
    pub fn with_side_effects(mut self) -> Self {
        self.side_effects = FunctionSideEffects::HasSideEffects;
        self
    }

    pub fn has_side_effects(&self) -> bool {
        self.side_effects == FunctionSideEffects::HasSideEffects
    }

    /// Signature of the binary `GEOMETRY x GEOMETRY -> BOOLEAN` predicate
    /// for `relation`.
    pub fn spatial_predicate(relation: SpatialRelation) -> Self {
        Self::new(
            relation.function_name(),
            vec![LogicalType::Geometry, LogicalType::Geometry],
            LogicalType::Boolean,
        )
    }
}

/// The closed set of spatial relations an R-tree scan can pre-filter.
///
/// Every relation here implies that the two geometries' bounding boxes
/// intersect, which is what makes the bounding box search a sound
/// pre-filter for all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpatialRelation {
    Equals,
    Intersects,
    Touches,
    Crosses,
    Within,
    Contains,
    Overlaps,
    Covers,
    CoveredBy,
    ContainsProperly,
}

static RELATIONS_BY_NAME: Lazy<FxHashMap<String, SpatialRelation>> = Lazy::new(|| {
    let mut map = FxHashMap::default();
    for relation in SpatialRelation::ALL {
        map.insert(relation.function_name().to_ascii_lowercase(), relation);
    }
    map
});

impl SpatialRelation {
    pub const ALL: [SpatialRelation; 10] = [
        SpatialRelation::Equals,
        SpatialRelation::Intersects,
        SpatialRelation::Touches,
        SpatialRelation::Crosses,
        SpatialRelation::Within,
        SpatialRelation::Contains,
        SpatialRelation::Overlaps,
        SpatialRelation::Covers,
        SpatialRelation::CoveredBy,
        SpatialRelation::ContainsProperly,
    ];

    pub fn function_name(&self) -> &'static str {
        match self {
            SpatialRelation::Equals => "ST_Equals",
            SpatialRelation::Intersects => "ST_Intersects",
            SpatialRelation::Touches => "ST_Touches",
            SpatialRelation::Crosses => "ST_Crosses",
            SpatialRelation::Within => "ST_Within",
            SpatialRelation::Contains => "ST_Contains",
            SpatialRelation::Overlaps => "ST_Overlaps",
            SpatialRelation::Covers => "ST_Covers",
            SpatialRelation::CoveredBy => "ST_CoveredBy",
            SpatialRelation::ContainsProperly => "ST_ContainsProperly",
        }
    }

    /// Resolve an `ST_`-prefixed function name, case-insensitively.
    ///
    /// ```
    /// use geoscan::function::SpatialRelation;
    ///
    /// assert_eq!(SpatialRelation::resolve("st_intersects"), Some(SpatialRelation::Intersects));
    /// assert_eq!(SpatialRelation::resolve("ST_COVEREDBY"), Some(SpatialRelation::CoveredBy));
    /// assert_eq!(SpatialRelation::resolve("CoveredBy"), None);
    /// assert_eq!(SpatialRelation::resolve("ST_Distance"), None);
    /// ```
    pub fn resolve(name: &str) -> Option<Self> {
        RELATIONS_BY_NAME.get(&name.to_ascii_lowercase()).copied()
    }
}

impl fmt::Display for SpatialRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.function_name())
    }
}

/// Implementation of a scalar function over already-evaluated arguments.
pub type ScalarFunctionImpl = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

/// Name-keyed (case-insensitive) table of scalar function implementations.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: FxHashMap<String, ScalarFunctionImpl>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the spatial predicates that have a direct
    /// counterpart in the `geo` crate (`ST_Intersects`, `ST_Contains`,
    /// `ST_Within`).
    pub fn with_spatial_predicates() -> Self {
        let mut registry = Self::new();
        registry.register(
            SpatialRelation::Intersects.function_name(),
            geometry_predicate(|a, b| a.intersects(b)),
        );
        registry.register(
            SpatialRelation::Contains.function_name(),
            geometry_predicate(|a, b| a.contains(b)),
        );
        registry.register(
            SpatialRelation::Within.function_name(),
            geometry_predicate(|a, b| b.contains(a)),
        );
        registry
    }

    pub fn register(&mut self, name: &str, function: ScalarFunctionImpl) {
        self.functions.insert(name.to_ascii_lowercase(), function);
    }

    pub fn get(&self, name: &str) -> Option<&ScalarFunctionImpl> {
        self.functions.get(&name.to_ascii_lowercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Call `name` with `args`.
    pub fn invoke(&self, name: &str, args: &[Value]) -> Result<Value> {
        let function = self
            .get(name)
            .ok_or_else(|| GeoscanError::Evaluation(format!("Unknown function: {}", name)))?;
        function(args)
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("FunctionRegistry")
            .field("functions", &names)
            .finish()
    }
}

/// Adapt a binary geometry predicate to a [`ScalarFunctionImpl`]. NULL in,
/// NULL out.
fn geometry_predicate<F>(predicate: F) -> ScalarFunctionImpl
where
    F: Fn(&geo::Geometry<f64>, &geo::Geometry<f64>) -> bool + Send + Sync + 'static,
{
    Arc::new(move |args: &[Value]| {
        let [left, right] = args else {
            return Err(GeoscanError::Evaluation(format!(
                "Expected 2 arguments, got {}",
                args.len()
            )));
        };
        match (left, right) {
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
            (Value::Geometry(a), Value::Geometry(b)) => Ok(Value::Boolean(predicate(a, b))),
            _ => Err(GeoscanError::Evaluation(
                "Spatial predicate arguments must be GEOMETRY".to_string(),
            )),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Geometry, Point, polygon};

    #[test]
    fn test_every_relation_resolves_by_its_name() {
        for relation in SpatialRelation::ALL {
            assert_eq!(SpatialRelation::resolve(relation.function_name()), Some(relation));
            assert_eq!(
                SpatialRelation::resolve(&relation.function_name().to_uppercase()),
                Some(relation)
            );
        }
    }

    #[test]
    fn test_non_relations_do_not_resolve() {
        assert_eq!(SpatialRelation::resolve("ST_Distance"), None);
        assert_eq!(SpatialRelation::resolve("ST_DWithin"), None);
        assert_eq!(SpatialRelation::resolve(""), None);
        assert_eq!(SpatialRelation::resolve("contains"), None);
        assert_eq!(SpatialRelation::resolve("Equals"), None);
        assert_eq!(SpatialRelation::resolve("covers"), None);
    }

    #[test]
    fn test_spatial_predicate_signature() {
        let function = ScalarFunction::spatial_predicate(SpatialRelation::Covers);
        assert_eq!(function.name, "ST_Covers");
        assert_eq!(
            function.arguments,
            vec![LogicalType::Geometry, LogicalType::Geometry]
        );
        assert_eq!(function.return_type, LogicalType::Boolean);
        assert!(!function.has_side_effects());
    }

    #[test]
    fn test_builtin_predicates() {
        let registry = FunctionRegistry::with_spatial_predicates();
        let square: Geometry<f64> = polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 0.0, y: 10.0),
            (x: 0.0, y: 0.0),
        ]
        .into();
        let inside = Value::Geometry(Point::new(5.0, 5.0).into());
        let outside = Value::Geometry(Point::new(50.0, 5.0).into());
        let square = Value::Geometry(square);

        let call = |name: &str, a: &Value, b: &Value| {
            registry.invoke(name, &[a.clone(), b.clone()]).unwrap()
        };
        assert_eq!(call("ST_Intersects", &square, &inside), Value::Boolean(true));
        assert_eq!(call("st_intersects", &square, &outside), Value::Boolean(false));
        assert_eq!(call("ST_Contains", &square, &inside), Value::Boolean(true));
        assert_eq!(call("ST_Within", &inside, &square), Value::Boolean(true));
        assert_eq!(call("ST_Within", &outside, &square), Value::Boolean(false));
        assert_eq!(call("ST_Intersects", &Value::Null, &square), Value::Null);
    }

    #[test]
    fn test_unknown_function() {
        let registry = FunctionRegistry::new();
        assert!(matches!(
            registry.invoke("ST_Area", &[]),
            Err(GeoscanError::Evaluation(_))
        ));
    }
}
