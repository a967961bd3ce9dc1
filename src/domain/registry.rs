// Catalog of built-in series-transformation functions
use crate::domain::functions::{FunctionDefinition, FunctionInstance, ParamType};
use crate::error::{DatasourceError, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

const HOW_OPTIONS: &[&str] = &["sum", "mean", "median", "min", "max", "None"];
const WIN_TYPE_OPTIONS: &[&str] = &["boxcar", "triang", "blackman", "hamming", "bartlett"];
const INTERPOLATE_OPTIONS: &[&str] = &["linear", "time", "index", "nearest"];

const ROLLING: &str = "Rolling Statistics";
const CUMULATIVE: &str = "Cumulative";
const ARITHMETIC: &str = "Arithmetic";
const MISSING: &str = "Missing Data";
const SELECTION: &str = "Selection";
const RESAMPLING: &str = "Resampling";

/// Immutable function catalog, indexed by primary name and short name.
///
/// Registration happens once inside `builtin()`; afterwards the registry is
/// handed around as an `Arc` and never mutated.
#[derive(Debug)]
pub struct FunctionRegistry {
    index: HashMap<String, Arc<FunctionDefinition>>,
    categories: BTreeMap<String, Vec<Arc<FunctionDefinition>>>,
}

impl FunctionRegistry {
    /// Build the full built-in catalog.
    pub fn builtin() -> Self {
        let mut registry = Self {
            index: HashMap::new(),
            categories: BTreeMap::new(),
        };
        for def in builtin_definitions() {
            registry.register(def);
        }
        registry.sort_categories();
        registry
    }

    fn register(&mut self, def: FunctionDefinition) {
        let def = Arc::new(def);
        for category in &def.categories {
            self.categories
                .entry(category.clone())
                .or_default()
                .push(def.clone());
        }
        if let Some(short_name) = &def.short_name {
            self.index.insert(short_name.clone(), def.clone());
        }
        self.index.insert(def.name.clone(), def);
    }

    fn sort_categories(&mut self) {
        for bucket in self.categories.values_mut() {
            bucket.sort_by(|a, b| a.name.cmp(&b.name));
        }
    }

    /// Resolve a definition by primary or short name.
    pub fn lookup(&self, name: &str) -> Option<Arc<FunctionDefinition>> {
        self.index.get(name).cloned()
    }

    /// Category label to definitions, buckets sorted by function name.
    pub fn categories(&self) -> &BTreeMap<String, Vec<Arc<FunctionDefinition>>> {
        &self.categories
    }

    /// Instantiate a catalog entry by name.
    pub fn create_instance(&self, name: &str, with_default_params: bool) -> Result<FunctionInstance> {
        let def = self
            .lookup(name)
            .ok_or_else(|| DatasourceError::FunctionNotFound(name.to_string()))?;
        Ok(FunctionInstance::new(def, with_default_params))
    }
}

fn rolling_stat(name: &str) -> FunctionDefinition {
    FunctionDefinition::new(name, ROLLING)
        .param("window", ParamType::Int)
        .param("min_periods", ParamType::Int)
        .optional_param("freq", ParamType::String)
        .optional_param("center", ParamType::Boolean)
        .optional_param_with_options("how", ParamType::String, HOW_OPTIONS)
        .defaults(&["10", "1"])
}

fn scalar_op(name: &str, default: &str) -> FunctionDefinition {
    FunctionDefinition::new(name, ARITHMETIC)
        .param("n", ParamType::Float)
        .defaults(&[default])
}

fn series_op(name: &str, default: &str) -> FunctionDefinition {
    FunctionDefinition::new(name, ARITHMETIC)
        .param("n", ParamType::ValueOrSeries)
        .defaults(&[default])
}

fn builtin_definitions() -> Vec<FunctionDefinition> {
    vec![
        rolling_stat("rolling_mean").short_name("rmean"),
        rolling_stat("rolling_count"),
        rolling_stat("rolling_sum"),
        rolling_stat("rolling_median"),
        rolling_stat("rolling_min"),
        rolling_stat("rolling_max"),
        rolling_stat("rolling_std").short_name("rstd"),
        rolling_stat("rolling_var"),
        rolling_stat("rolling_skew"),
        rolling_stat("rolling_kurtosis"),
        FunctionDefinition::new("rolling_window", ROLLING)
            .param("window", ParamType::IntOrInterval)
            .param("min_periods", ParamType::Int)
            .optional_param("freq", ParamType::String)
            .optional_param_with_options("win_type", ParamType::String, WIN_TYPE_OPTIONS)
            .defaults(&["10", "1"]),
        FunctionDefinition::new("cumsum", CUMULATIVE),
        FunctionDefinition::new("cumprod", CUMULATIVE),
        FunctionDefinition::new("diff", CUMULATIVE),
        series_op("add", "0"),
        series_op("sub", "0"),
        series_op("mul", "1"),
        series_op("div", "1"),
        scalar_op("floordiv", "1"),
        scalar_op("mod", "1"),
        scalar_op("pow", "1"),
        FunctionDefinition::new("abs", ARITHMETIC),
        FunctionDefinition::new("round", ARITHMETIC).optional_param("decimals", ParamType::Int),
        FunctionDefinition::new("clip", ARITHMETIC)
            .param("lower", ParamType::Float)
            .param("upper", ParamType::Float)
            .defaults(&["0", "1"]),
        scalar_op("clip_lower", "0"),
        scalar_op("clip_upper", "1"),
        FunctionDefinition::new("dropna", MISSING),
        FunctionDefinition::new("fillna", MISSING)
            .param("n", ParamType::Float)
            .defaults(&["0"]),
        FunctionDefinition::new("interpolate", MISSING)
            .short_name("interp")
            .optional_param_with_options("method", ParamType::String, INTERPOLATE_OPTIONS),
        FunctionDefinition::new("nlargest", SELECTION)
            .param("n", ParamType::Int)
            .defaults(&["1"]),
        FunctionDefinition::new("nsmallest", SELECTION)
            .param("n", ParamType::Int)
            .defaults(&["1"]),
        FunctionDefinition::new("nonzero", SELECTION),
        FunctionDefinition::new("rank", SELECTION),
        FunctionDefinition::new("resample", RESAMPLING)
            .param("rule", ParamType::String)
            .optional_param_with_options("how", ParamType::String, HOW_OPTIONS)
            .defaults(&["1h"]),
        FunctionDefinition::new("shift", RESAMPLING)
            .param("periods", ParamType::Int)
            .defaults(&["0"]),
    ]
}
