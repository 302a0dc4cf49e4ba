//! Call template engine
//!
//! Payload and metadata text may embed `{{ ... }}` actions that reference the
//! per-call [`CallTemplateContext`](crate::context::CallTemplateContext) and
//! a small function library:
//!
//! ```text
//! {"name":"{{.WorkerID}}-{{.RequestNumber}}"}
//! {"file":"{{ListFile "./data" | RoundRobin}}"}
//! {"id":"{{ $n := RandomInt 0 100 }}{{ $n }}"}
//! ```
//!
//! Supported syntax: literal text, field references (`.Name`, `.`),
//! variables (`$x := ...`, `$x = ...`, `$x`), string/int/bool literals,
//! parenthesised sub-pipelines, `|` chaining (the piped value is passed as the
//! last argument), `{{-`/`-}}` whitespace trimming and `{{/* comments */}}`.
//! Control structures (`if`, `range`, ...) are not part of the language.
//!
//! Parsing is pure, so parsed templates are memoised in a process-wide
//! [`TemplateCache`] keyed by source text.

mod eval;
mod funcs;
mod parse;
mod value;

pub use funcs::{
    b64_decode, b64_encode, list_file, random_choice, random_int, random_slice, random_slice_k,
    range, read, round_robin, shuffle, split, to_int, Func,
};
pub use value::{Kind, Value};

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use rand::rngs::StdRng;

use eval::Exec;
use parse::Node;

/// Template parse and evaluation errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum TemplateError {
    /// Malformed template syntax
    #[error("template: {0}")]
    Parse(String),

    /// Reference to a function outside the library
    #[error("template: function {0:?} not defined")]
    UndefinedFunction(String),

    /// Reference to a variable never declared
    #[error("template: undefined variable {0:?}")]
    UndefinedVariable(String),

    /// Reference to a field the context does not have
    #[error("template: can't evaluate field {0}")]
    UnknownField(String),

    /// Arguments given to something that is not a function
    #[error("template: can't give argument to non-function {0}")]
    NotAFunction(String),

    /// Wrong number of arguments
    #[error("template: wrong number of args for {func}: want {want} got {got}")]
    Arity {
        /// Function name
        func: &'static str,
        /// Expected count
        want: usize,
        /// Supplied count
        got: usize,
    },

    /// Argument of the wrong type
    #[error("template: wrong type for value in {func}; expected {expected}; got {found}")]
    Type {
        /// Function name
        func: &'static str,
        /// Parameter type
        expected: Kind,
        /// Supplied type
        found: Kind,
    },

    /// A file could not be read or listed
    #[error("{func} {path}: {source}")]
    Io {
        /// Function name
        func: &'static str,
        /// Path involved
        path: String,
        /// Underlying error
        #[source]
        source: Arc<std::io::Error>,
    },

    /// Malformed input text (bad integer, bad base64)
    #[error("{func}: {message}")]
    Format {
        /// Function name
        func: &'static str,
        /// Details
        message: String,
    },

    /// Input outside the function's domain (empty list, bad range)
    #[error("{func}: {message}")]
    InvalidValue {
        /// Function name
        func: &'static str,
        /// Details
        message: String,
    },
}

/// Metadata expansion errors
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    /// Expanded text is not a JSON object of string values
    #[error("metadata must be a JSON object of strings: {0}")]
    Json(#[from] serde_json::Error),
}

/// What a template can see: named fields, `.` itself, and the request number
/// that `RoundRobin` keys off
pub trait TemplateData {
    /// Value of field `.name`, if it exists
    fn field(&self, name: &str) -> Option<Value>;

    /// Printed form of `.`
    fn dot(&self) -> Value;

    /// Sequence number of the call being rendered
    fn request_number(&self) -> u64;
}

/// A parsed template
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    nodes: Vec<Node>,
}

impl Template {
    /// Parse template source
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        Ok(Self {
            nodes: parse::parse(source)?,
        })
    }

    /// Execute against `data`, drawing randomness from `rng`
    pub fn render<D: TemplateData + ?Sized>(
        &self,
        data: &D,
        rng: &mut StdRng,
    ) -> Result<String, TemplateError> {
        Exec::new(data, rng).render(&self.nodes)
    }
}

/// Whether `source` contains any action delimiters at all
pub fn has_actions(source: &str) -> bool {
    source.contains("{{")
}

/// Parsed templates keyed by their source text
///
/// Parse failures are cached as well, so a bad template is only parsed once.
#[derive(Debug, Default)]
pub struct TemplateCache {
    entries: RwLock<HashMap<String, Result<Arc<Template>, TemplateError>>>,
}

impl TemplateCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// The cache shared by every worker in the process
    pub fn global() -> &'static TemplateCache {
        static CACHE: OnceLock<TemplateCache> = OnceLock::new();
        CACHE.get_or_init(TemplateCache::new)
    }

    /// Parsed template for `source`, parsing on first use
    pub fn get(&self, source: &str) -> Result<Arc<Template>, TemplateError> {
        if let Ok(entries) = self.entries.read() {
            if let Some(entry) = entries.get(source) {
                return entry.clone();
            }
        }

        let parsed = Template::parse(source).map(Arc::new);
        if let Ok(mut entries) = self.entries.write() {
            entries
                .entry(source.to_string())
                .or_insert_with(|| parsed.clone());
        }
        parsed
    }

    /// Number of distinct sources seen
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Whether nothing has been cached yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
