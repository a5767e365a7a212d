// ── Dynamic values and declared types ──
//
// Attributes and operations traffic in `BusValue`, a dynamic value
// that can carry anything from a scalar to a whole object graph.
// Compound nodes are `Arc`-shared: beans hand out graphs that may
// share (or, through `OpenBean`, revisit) subtrees, and the protocol
// layer's serializer tracks node identity along each descent.
//
// `BusType` is the declared side: bean metadata describes attributes
// and operation parameters with it, and the JSON-to-value direction
// parses against it.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

/// An introspectable object graph node: the "open bean" shape.
///
/// This is the seam for values that are neither scalars nor standard
/// containers. Implementations expose named properties which may in
/// turn be further `BusValue`s, including other beans (graphs may
/// contain cycles; the serializer breaks them by identity).
pub trait OpenBean: Send + Sync {
    /// Type label shown in metadata and string forms.
    fn type_name(&self) -> &str;

    /// Property names, in presentation order.
    fn keys(&self) -> Vec<String>;

    /// Look up one property.
    fn get(&self, key: &str) -> Option<BusValue>;

    /// The string form used when the value cannot be expanded further.
    fn render(&self) -> String {
        format!("<{}>", self.type_name())
    }
}

/// A record with a fixed, typed field schema.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeValue {
    pub type_name: String,
    pub fields: IndexMap<String, BusValue>,
}

/// Rows of composite values indexed by a typed key column set.
#[derive(Debug, Clone, PartialEq)]
pub struct TableValue {
    pub type_name: String,
    /// Field names forming the row index, in order.
    pub index: Vec<String>,
    pub rows: Vec<Arc<CompositeValue>>,
}

impl TableValue {
    /// Find the row whose index columns render to the given key values.
    pub fn row(&self, key: &[&str]) -> Option<&Arc<CompositeValue>> {
        if key.len() != self.index.len() {
            return None;
        }
        self.rows.iter().find(|row| {
            self.index
                .iter()
                .zip(key)
                .all(|(col, want)| match row.fields.get(col) {
                    Some(v) => v.string_form() == *want,
                    None => false,
                })
        })
    }
}

/// A dynamic management-bus value.
#[derive(Clone)]
pub enum BusValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// An indexed sequence (also covers set-shaped results).
    Seq(Arc<Vec<BusValue>>),
    /// A keyed mapping, iteration order preserved.
    Map(Arc<IndexMap<String, BusValue>>),
    Composite(Arc<CompositeValue>),
    Table(Arc<TableValue>),
    /// An introspectable object graph.
    Bean(Arc<dyn OpenBean>),
    /// Terminal fallback: only a string form exists.
    Opaque(Arc<str>),
}

impl BusValue {
    pub fn seq(items: Vec<BusValue>) -> Self {
        Self::Seq(Arc::new(items))
    }

    pub fn map(entries: IndexMap<String, BusValue>) -> Self {
        Self::Map(Arc::new(entries))
    }

    pub fn composite(type_name: impl Into<String>, fields: IndexMap<String, BusValue>) -> Self {
        Self::Composite(Arc::new(CompositeValue {
            type_name: type_name.into(),
            fields,
        }))
    }

    pub fn opaque(rendered: impl Into<String>) -> Self {
        Self::Opaque(Arc::from(rendered.into().as_str()))
    }

    /// Whether this node is a compound shape whose identity the
    /// serializer tracks during descent.
    pub fn is_compound(&self) -> bool {
        matches!(
            self,
            Self::Seq(_) | Self::Map(_) | Self::Composite(_) | Self::Table(_) | Self::Bean(_)
        )
    }

    /// Identity of a compound node, used for cycle breaking.
    pub fn identity(&self) -> Option<usize> {
        match self {
            Self::Seq(v) => Some(Arc::as_ptr(v) as *const () as usize),
            Self::Map(m) => Some(Arc::as_ptr(m) as *const () as usize),
            Self::Composite(c) => Some(Arc::as_ptr(c) as *const () as usize),
            Self::Table(t) => Some(Arc::as_ptr(t) as *const () as usize),
            Self::Bean(b) => Some(Arc::as_ptr(b) as *const () as usize),
            _ => None,
        }
    }

    /// The bounded string form used at depth exhaustion, on cycle
    /// revisits, and for opaque values. Never recurses into compounds.
    pub fn string_form(&self) -> String {
        match self {
            Self::Null => "null".to_owned(),
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Text(s) => s.clone(),
            Self::Seq(v) => format!("[seq of {}]", v.len()),
            Self::Map(m) => format!("[map of {}]", m.len()),
            Self::Composite(c) => format!("[{}]", c.type_name),
            Self::Table(t) => format!("[table {} of {} rows]", t.type_name, t.rows.len()),
            Self::Bean(b) => b.render(),
            Self::Opaque(s) => s.to_string(),
        }
    }

    /// Short shape label for error messages.
    pub fn shape(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "string",
            Self::Seq(_) => "seq",
            Self::Map(_) => "map",
            Self::Composite(_) => "composite",
            Self::Table(_) => "table",
            Self::Bean(_) => "bean",
            Self::Opaque(_) => "opaque",
        }
    }
}

impl fmt::Debug for BusValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Seq(v) => f.debug_tuple("Seq").field(&v.len()).finish(),
            Self::Map(m) => f.debug_tuple("Map").field(&m.len()).finish(),
            Self::Bean(b) => f.debug_tuple("Bean").field(&b.type_name()).finish(),
            other => write!(f, "{}", other.string_form()),
        }
    }
}

impl PartialEq for BusValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Seq(a), Self::Seq(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::Composite(a), Self::Composite(b)) => a == b,
            (Self::Table(a), Self::Table(b)) => a == b,
            (Self::Bean(a), Self::Bean(b)) => Arc::ptr_eq(a, b),
            (Self::Opaque(a), Self::Opaque(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for BusValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for BusValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for BusValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for BusValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for BusValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for BusValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

// ── Declared types ──────────────────────────────────────────────────

/// Schema of a composite value: field name, type, description.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeSchema {
    pub type_name: String,
    pub fields: Vec<(String, BusType)>,
}

/// The declared type of an attribute, parameter or return value.
#[derive(Debug, Clone, PartialEq)]
pub enum BusType {
    Bool,
    Int,
    Float,
    Text,
    Seq(Box<BusType>),
    Map(Box<BusType>),
    Composite(CompositeSchema),
    Table {
        index: Vec<String>,
        row: CompositeSchema,
    },
    /// Structural: accept whatever JSON shape arrives.
    Any,
}

impl fmt::Display for BusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => write!(f, "bool"),
            Self::Int => write!(f, "int"),
            Self::Float => write!(f, "float"),
            Self::Text => write!(f, "string"),
            Self::Seq(inner) => write!(f, "seq<{inner}>"),
            Self::Map(inner) => write!(f, "map<{inner}>"),
            Self::Composite(schema) => write!(f, "composite<{}>", schema.type_name),
            Self::Table { row, .. } => write!(f, "table<{}>", row.type_name),
            Self::Any => write!(f, "any"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(used: i64, max: i64) -> CompositeValue {
        let mut fields = IndexMap::new();
        fields.insert("used".to_owned(), BusValue::Int(used));
        fields.insert("max".to_owned(), BusValue::Int(max));
        CompositeValue {
            type_name: "MemoryUsage".to_owned(),
            fields,
        }
    }

    #[test]
    fn identity_follows_arc_sharing() {
        let shared = BusValue::seq(vec![BusValue::Int(1)]);
        let clone = shared.clone();
        assert_eq!(shared.identity(), clone.identity());

        let other = BusValue::seq(vec![BusValue::Int(1)]);
        assert_ne!(shared.identity(), other.identity());
        assert!(BusValue::Int(1).identity().is_none());
    }

    #[test]
    fn string_form_never_recurses() {
        let v = BusValue::seq(vec![BusValue::seq(vec![])]);
        assert_eq!(v.string_form(), "[seq of 1]");
        assert_eq!(BusValue::Float(1.5).string_form(), "1.5");
    }

    #[test]
    fn table_row_lookup_by_index_values() {
        let table = TableValue {
            type_name: "Props".to_owned(),
            index: vec!["used".to_owned()],
            rows: vec![Arc::new(usage(1, 10)), Arc::new(usage(2, 20))],
        };
        assert_eq!(
            table.row(&["2"]).unwrap().fields.get("max"),
            Some(&BusValue::Int(20))
        );
        assert!(table.row(&["3"]).is_none());
        assert!(table.row(&["2", "extra"]).is_none());
    }

    #[test]
    fn bus_type_display() {
        assert_eq!(BusType::Seq(Box::new(BusType::Int)).to_string(), "seq<int>");
        assert_eq!(
            BusType::Composite(CompositeSchema {
                type_name: "MemoryUsage".to_owned(),
                fields: vec![],
            })
            .to_string(),
            "composite<MemoryUsage>"
        );
    }
}
