//! Stage descriptors: the contract a stage exposes to the graph builder
//!
//! A descriptor declares the configurable property slots of a stage, the
//! outcomes of a filter, the output data streams a stage fans out into and
//! a pure function computing output columns from the current configuration.

use pipewright_core::{StageKind, TypeFamily};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// What a property slot holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotKind {
    /// Input column(s) of the given family (`Unknown` accepts any)
    Column { accepts: TypeFamily },

    /// Literal, enum or array value
    Value,
}

/// A configurable property of a stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySlot {
    /// Property name, unique within the descriptor
    pub name: String,

    /// Column or value slot
    pub kind: SlotKind,

    /// Must be set for the stage to be configured
    pub required: bool,

    /// Multi-valued
    pub array: bool,

    /// Allowed values for enum-like value slots (empty: anything)
    pub allowed_values: Vec<String>,

    /// Changing the value recomputes output columns
    pub affects_output: bool,
}

impl PropertySlot {
    /// Column slot accepting the given family
    pub fn column(name: impl Into<String>, accepts: TypeFamily) -> Self {
        Self {
            name: name.into(),
            kind: SlotKind::Column { accepts },
            required: false,
            array: false,
            allowed_values: Vec::new(),
            affects_output: true,
        }
    }

    /// Value slot
    pub fn value(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SlotKind::Value,
            required: false,
            array: false,
            allowed_values: Vec::new(),
            affects_output: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn array(mut self) -> Self {
        self.array = true;
        self
    }

    pub fn affects_output(mut self) -> Self {
        self.affects_output = true;
        self
    }

    pub fn allowed<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_column(&self) -> bool {
        matches!(self.kind, SlotKind::Column { .. })
    }

    /// Family accepted by a column slot
    pub fn accepts(&self) -> Option<TypeFamily> {
        match self.kind {
            SlotKind::Column { accepts } => Some(accepts),
            SlotKind::Value => None,
        }
    }
}

/// Name and family of a bound input as seen by output rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputInfo {
    pub name: String,
    pub family: TypeFamily,
}

impl InputInfo {
    pub fn new(name: impl Into<String>, family: TypeFamily) -> Self {
        Self {
            name: name.into(),
            family,
        }
    }
}

/// Current configuration of a stage, the input of output rules
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputContext {
    inputs: BTreeMap<String, Vec<InputInfo>>,
    properties: BTreeMap<String, Value>,
}

impl OutputContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_inputs(mut self, slot: impl Into<String>, inputs: Vec<InputInfo>) -> Self {
        self.inputs.insert(slot.into(), inputs);
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: Value) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    /// Inputs bound to a column slot, in binding order
    pub fn inputs(&self, slot: &str) -> &[InputInfo] {
        self.inputs.get(slot).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// String entries of a property (a scalar string counts as one entry)
    pub fn property_strings(&self, name: &str) -> Vec<String> {
        match self.properties.get(name) {
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// A column a stage will produce
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutputColumnSpec {
    pub name: String,
    pub family: TypeFamily,
}

impl OutputColumnSpec {
    pub fn new(name: impl Into<String>, family: TypeFamily) -> Self {
        Self {
            name: name.into(),
            family,
        }
    }
}

/// Custom output function
pub type OutputFn = Arc<dyn Fn(&OutputContext) -> Vec<OutputColumnSpec> + Send + Sync>;

/// Declarative output column rule
#[derive(Clone)]
pub enum OutputRule {
    /// Produces nothing
    None,

    /// Always the same columns
    Fixed(Vec<OutputColumnSpec>),

    /// One column per input bound to `slot`, named `<input><suffix>`;
    /// `family` of `None` keeps the input's family
    PerInput {
        slot: String,
        suffix: String,
        family: Option<TypeFamily>,
    },

    /// One column per string entry of a value property
    FromProperty { property: String, family: TypeFamily },

    /// Arbitrary pure function of the configuration
    Custom(OutputFn),
}

impl OutputRule {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&OutputContext) -> Vec<OutputColumnSpec> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    /// Evaluate the rule against the current configuration
    pub fn evaluate(&self, ctx: &OutputContext) -> Vec<OutputColumnSpec> {
        match self {
            Self::None => Vec::new(),
            Self::Fixed(columns) => columns.clone(),
            Self::PerInput { slot, suffix, family } => ctx
                .inputs(slot)
                .iter()
                .map(|input| {
                    OutputColumnSpec::new(format!("{}{}", input.name, suffix), family.unwrap_or(input.family))
                })
                .collect(),
            Self::FromProperty { property, family } => ctx
                .property_strings(property)
                .into_iter()
                .map(|name| OutputColumnSpec::new(name, *family))
                .collect(),
            Self::Custom(f) => f(ctx),
        }
    }
}

impl fmt::Debug for OutputRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Fixed(columns) => f.debug_tuple("Fixed").field(columns).finish(),
            Self::PerInput { slot, suffix, family } => f
                .debug_struct("PerInput")
                .field("slot", slot)
                .field("suffix", suffix)
                .field("family", family)
                .finish(),
            Self::FromProperty { property, family } => f
                .debug_struct("FromProperty")
                .field("property", property)
                .field("family", family)
                .finish(),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// A nested pipeline namespace exposed by a stage
#[derive(Debug, Clone)]
pub struct OutputStreamSpec {
    /// Stream name, unique within the descriptor
    pub name: String,

    /// Columns projected into the stream
    pub columns: OutputRule,
}

impl OutputStreamSpec {
    pub fn new(name: impl Into<String>, columns: OutputRule) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }
}

/// Contract of a stage as seen by the graph builder
pub trait StageDescriptor: Send + Sync + fmt::Debug {
    /// Display name, also the lookup key in descriptor providers
    fn name(&self) -> &str;

    /// Filter, transformer or analyzer
    fn kind(&self) -> StageKind;

    /// Property slots in declaration order
    fn slots(&self) -> &[PropertySlot];

    /// Look up a slot by name
    fn slot(&self, name: &str) -> Option<&PropertySlot> {
        self.slots().iter().find(|s| s.name == name)
    }

    /// Outcome categories of a filter
    fn outcomes(&self) -> &[String] {
        &[]
    }

    /// Output data streams the stage fans out into
    fn output_streams(&self) -> &[OutputStreamSpec] {
        &[]
    }

    /// Output columns for the current configuration (pure)
    fn output_columns(&self, _ctx: &OutputContext) -> Vec<OutputColumnSpec> {
        Vec::new()
    }

    /// Columns projected into a stream for the current configuration (pure)
    fn stream_columns(&self, stream: &str, ctx: &OutputContext) -> Vec<OutputColumnSpec> {
        self.output_streams()
            .iter()
            .find(|s| s.name == stream)
            .map(|s| s.columns.evaluate(ctx))
            .unwrap_or_default()
    }
}

/// Declarative descriptor implementation
#[derive(Debug, Clone)]
pub struct SimpleDescriptor {
    name: String,
    kind: StageKind,
    slots: Vec<PropertySlot>,
    outcomes: Vec<String>,
    output: OutputRule,
    streams: Vec<OutputStreamSpec>,
}

impl SimpleDescriptor {
    pub fn new(name: impl Into<String>, kind: StageKind) -> Self {
        Self {
            name: name.into(),
            kind,
            slots: Vec::new(),
            outcomes: Vec::new(),
            output: OutputRule::None,
            streams: Vec::new(),
        }
    }

    pub fn filter<I, S>(name: impl Into<String>, outcomes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut descriptor = Self::new(name, StageKind::Filter);
        descriptor.outcomes = outcomes.into_iter().map(Into::into).collect();
        descriptor
    }

    pub fn transformer(name: impl Into<String>) -> Self {
        Self::new(name, StageKind::Transformer)
    }

    pub fn analyzer(name: impl Into<String>) -> Self {
        Self::new(name, StageKind::Analyzer)
    }

    pub fn with_slot(mut self, slot: PropertySlot) -> Self {
        self.slots.push(slot);
        self
    }

    pub fn with_output(mut self, output: OutputRule) -> Self {
        self.output = output;
        self
    }

    pub fn with_stream(mut self, stream: OutputStreamSpec) -> Self {
        self.streams.push(stream);
        self
    }

    /// Finish building as a shareable descriptor
    pub fn build(self) -> Arc<dyn StageDescriptor> {
        Arc::new(self)
    }
}

impl StageDescriptor for SimpleDescriptor {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        self.kind
    }

    fn slots(&self) -> &[PropertySlot] {
        &self.slots
    }

    fn outcomes(&self) -> &[String] {
        &self.outcomes
    }

    fn output_streams(&self) -> &[OutputStreamSpec] {
        &self.streams
    }

    fn output_columns(&self, ctx: &OutputContext) -> Vec<OutputColumnSpec> {
        // Filters only categorize
        if self.kind == StageKind::Filter {
            return Vec::new();
        }
        self.output.evaluate(ctx)
    }
}
