// Series-transformation function definitions and parameterized instances
use crate::domain::registry::FunctionRegistry;
use crate::domain::target::SavedFunction;
use crate::error::{DatasourceError, Result};
use std::sync::Arc;

/// Declared type of a function parameter. Only rendering cares about the
/// distinction: some types pass through unquoted, the rest are single-quoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Int,
    Float,
    String,
    Boolean,
    ValueOrSeries,
    IntOrInterval,
}

#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamType,
    pub options: Vec<String>,
    pub optional: bool,
}

/// One entry of the function catalog. Built once during registry bootstrap
/// and shared read-only between every instance referencing it.
#[derive(Debug, Clone)]
pub struct FunctionDefinition {
    pub name: String,
    pub short_name: Option<String>,
    pub params: Vec<ParamSpec>,
    pub default_params: Vec<String>,
    pub categories: Vec<String>,
}

impl FunctionDefinition {
    pub(crate) fn new(name: &str, category: &str) -> Self {
        Self {
            name: name.to_string(),
            short_name: None,
            params: Vec::new(),
            default_params: Vec::new(),
            categories: vec![category.to_string()],
        }
    }

    pub(crate) fn short_name(mut self, short_name: &str) -> Self {
        self.short_name = Some(short_name.to_string());
        self
    }

    pub(crate) fn param(mut self, name: &str, kind: ParamType) -> Self {
        self.params.push(ParamSpec {
            name: name.to_string(),
            kind,
            options: Vec::new(),
            optional: false,
        });
        self
    }

    pub(crate) fn optional_param(mut self, name: &str, kind: ParamType) -> Self {
        self.params.push(ParamSpec {
            name: name.to_string(),
            kind,
            options: Vec::new(),
            optional: true,
        });
        self
    }

    pub(crate) fn optional_param_with_options(
        mut self,
        name: &str,
        kind: ParamType,
        options: &[&str],
    ) -> Self {
        self.params.push(ParamSpec {
            name: name.to_string(),
            kind,
            options: options.iter().map(|o| o.to_string()).collect(),
            optional: true,
        });
        self
    }

    pub(crate) fn defaults(mut self, defaults: &[&str]) -> Self {
        self.default_params = defaults.iter().map(|d| d.to_string()).collect();
        self
    }
}

/// A parameterized invocation of a catalog entry, as edited inside one
/// dashboard target's pipeline. Parameters are stored as raw strings and
/// interpreted against the definition's types only when rendered.
#[derive(Debug, Clone)]
pub struct FunctionInstance {
    def: Arc<FunctionDefinition>,
    params: Vec<String>,
    text: String,
}

impl FunctionInstance {
    pub fn new(def: Arc<FunctionDefinition>, with_default_params: bool) -> Self {
        let params = if with_default_params {
            def.default_params.clone()
        } else {
            Vec::new()
        };
        Self::with_params(def, params)
    }

    /// Rebuild an instance from its persisted form, resolving the name
    /// through the registry.
    pub fn from_saved(registry: &FunctionRegistry, saved: &SavedFunction) -> Result<Self> {
        let def = registry
            .lookup(&saved.name)
            .ok_or_else(|| DatasourceError::FunctionNotFound(saved.name.clone()))?;
        Ok(Self::with_params(def, saved.params.clone()))
    }

    fn with_params(def: Arc<FunctionDefinition>, params: Vec<String>) -> Self {
        let mut instance = Self {
            def,
            params,
            text: String::new(),
        };
        instance.refresh_text();
        instance
    }

    pub fn definition(&self) -> &FunctionDefinition {
        &self.def
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Cached textual form, kept in sync with the parameters.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn to_saved(&self) -> SavedFunction {
        SavedFunction {
            name: self.def.name.clone(),
            params: self.params.clone(),
        }
    }

    /// Apply a raw edit to the parameter at `index`.
    ///
    /// A comma-bearing value whose successor slot is optional is split and
    /// distributed over `index, index + 1, ...`, so one free-text edit can
    /// fill several trailing optional slots. An empty edit on an optional
    /// slot removes it.
    pub fn update_param(&mut self, index: usize, raw: &str) {
        self.apply_param(index, raw);
        self.refresh_text();
    }

    fn apply_param(&mut self, index: usize, raw: &str) {
        if raw.contains(',') && self.optional_at(index + 1) {
            for (offset, part) in raw.split(',').enumerate() {
                self.apply_param(index + offset, part.trim());
            }
            return;
        }

        if raw.trim().is_empty() && self.optional_at(index) {
            if index < self.params.len() {
                self.params.remove(index);
            }
            return;
        }

        if index >= self.params.len() {
            self.params.resize(index + 1, String::new());
        }
        self.params[index] = raw.to_string();
    }

    fn optional_at(&self, index: usize) -> bool {
        self.def.params.get(index).is_some_and(|p| p.optional)
    }

    /// Render the textual form `name(arg0, arg1, ...)`, optionally placing
    /// an upstream series expression as the first argument.
    pub fn render(&self, series_expr: Option<&str>) -> String {
        let mut args: Vec<String> = self
            .params
            .iter()
            .enumerate()
            .map(|(index, value)| self.format_arg(index, value))
            .collect();
        if let Some(expr) = series_expr {
            args.insert(0, expr.to_string());
        }
        format!("{}({})", self.def.name, args.join(", "))
    }

    fn format_arg(&self, index: usize, value: &str) -> String {
        // Slots beyond the declared schema fall through to the quoted form.
        match self.def.params.get(index).map(|p| p.kind) {
            Some(ParamType::Int | ParamType::Boolean | ParamType::ValueOrSeries) => {
                value.to_string()
            }
            Some(ParamType::IntOrInterval) if is_numeric(value) => value.to_string(),
            _ => format!("'{value}'"),
        }
    }

    fn refresh_text(&mut self) {
        self.text = self.render(None);
    }
}

fn is_numeric(value: &str) -> bool {
    value.trim().parse::<f64>().is_ok()
}
