//! Functions callable from payload and metadata templates
//!
//! Every function is available under its template name (`RandomChoice`,
//! `Range`, ...) and as a plain Rust function for direct use. Random functions
//! draw from the caller's generator; nothing here touches shared state.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::seq::{index, SliceRandom};
use rand::Rng;

use super::value::{Kind, Value};
use super::TemplateError;

/// Template function identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Func {
    /// `Read path`
    Read,
    /// `ListFile dir`
    ListFile,
    /// `RandomChoice values`
    RandomChoice,
    /// `RandomSlice values`
    RandomSlice,
    /// `RandomSliceK values k`
    RandomSliceK,
    /// `RandomInt low high`
    RandomInt,
    /// `Shuffle values`
    Shuffle,
    /// `RoundRobin values`
    RoundRobin,
    /// `Range start end step`
    Range,
    /// `ToInt text`
    ToInt,
    /// `Join values sep`
    Join,
    /// `Split text sep`
    Split,
    /// `B64Encode text`
    B64Encode,
    /// `B64Decode text`
    B64Decode,
}

impl Func {
    /// Every function, in documentation order
    pub const ALL: [Func; 14] = [
        Func::Read,
        Func::ListFile,
        Func::RandomChoice,
        Func::RandomSlice,
        Func::RandomSliceK,
        Func::RandomInt,
        Func::Shuffle,
        Func::RoundRobin,
        Func::Range,
        Func::ToInt,
        Func::Join,
        Func::Split,
        Func::B64Encode,
        Func::B64Decode,
    ];

    /// Look up a function by its template name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    /// Template name
    pub fn name(self) -> &'static str {
        match self {
            Func::Read => "Read",
            Func::ListFile => "ListFile",
            Func::RandomChoice => "RandomChoice",
            Func::RandomSlice => "RandomSlice",
            Func::RandomSliceK => "RandomSliceK",
            Func::RandomInt => "RandomInt",
            Func::Shuffle => "Shuffle",
            Func::RoundRobin => "RoundRobin",
            Func::Range => "Range",
            Func::ToInt => "ToInt",
            Func::Join => "Join",
            Func::Split => "Split",
            Func::B64Encode => "B64Encode",
            Func::B64Decode => "B64Decode",
        }
    }

    /// Parameter types
    pub fn params(self) -> &'static [Kind] {
        match self {
            Func::Read | Func::ListFile | Func::ToInt | Func::B64Encode | Func::B64Decode => {
                &[Kind::Str]
            }
            Func::RandomChoice | Func::RandomSlice | Func::Shuffle | Func::RoundRobin => {
                &[Kind::List]
            }
            Func::RandomSliceK => &[Kind::List, Kind::Int],
            Func::RandomInt => &[Kind::Int, Kind::Int],
            Func::Range => &[Kind::Int, Kind::Int, Kind::Int],
            Func::Join => &[Kind::List, Kind::Str],
            Func::Split => &[Kind::Str, Kind::Str],
        }
    }

    /// Invoke with already-evaluated arguments
    pub(crate) fn call<R: Rng + ?Sized>(
        self,
        args: Vec<Value>,
        request_number: u64,
        rng: &mut R,
    ) -> Result<Value, TemplateError> {
        let mut args = Args::check(self, args)?;

        let value = match self {
            Func::Read => Value::Str(read(&args.str())?),
            Func::ListFile => Value::List(list_file(&args.str())?),
            Func::RandomChoice => Value::Str(random_choice(&args.list(), rng)?),
            Func::RandomSlice => Value::List(random_slice(&args.list(), rng)?),
            Func::RandomSliceK => {
                let values = args.list();
                Value::List(random_slice_k(&values, args.int(), rng)?)
            }
            Func::RandomInt => {
                let low = args.int();
                Value::Str(random_int(low, args.int(), rng)?)
            }
            Func::Shuffle => Value::List(shuffle(&args.list(), rng)),
            Func::RoundRobin => Value::Str(round_robin(&args.list(), request_number)?),
            Func::Range => {
                let (start, end) = (args.int(), args.int());
                Value::List(range(start, end, args.int()))
            }
            Func::ToInt => Value::Int(to_int(&args.str())?),
            Func::Join => {
                let values = args.list();
                Value::Str(values.join(&args.str()))
            }
            Func::Split => {
                let s = args.str();
                Value::List(split(&s, &args.str()))
            }
            Func::B64Encode => Value::Str(b64_encode(&args.str())),
            Func::B64Decode => Value::Str(b64_decode(&args.str())?),
        };

        Ok(value)
    }
}

/// Type-checked argument list, consumed front to back
struct Args(std::vec::IntoIter<Value>);

impl Args {
    fn check(func: Func, args: Vec<Value>) -> Result<Self, TemplateError> {
        let params = func.params();
        if args.len() != params.len() {
            return Err(TemplateError::Arity {
                func: func.name(),
                want: params.len(),
                got: args.len(),
            });
        }

        for (arg, expected) in args.iter().zip(params) {
            if arg.kind() != *expected {
                return Err(TemplateError::Type {
                    func: func.name(),
                    expected: *expected,
                    found: arg.kind(),
                });
            }
        }

        Ok(Self(args.into_iter()))
    }

    // Kinds were verified by `check`.
    fn str(&mut self) -> String {
        match self.0.next() {
            Some(Value::Str(s)) => s,
            _ => String::new(),
        }
    }

    fn int(&mut self) -> i64 {
        match self.0.next() {
            Some(Value::Int(n)) => n,
            _ => 0,
        }
    }

    fn list(&mut self) -> Vec<String> {
        match self.0.next() {
            Some(Value::List(items)) => items,
            _ => Vec::new(),
        }
    }
}

fn empty_values(func: &'static str) -> TemplateError {
    TemplateError::InvalidValue {
        func,
        message: "values is empty".into(),
    }
}

/// File contents with surrounding whitespace trimmed
pub fn read(path: &str) -> Result<String, TemplateError> {
    let bytes = fs::read(path).map_err(|e| TemplateError::Io {
        func: "Read",
        path: path.to_string(),
        source: Arc::new(e),
    })?;
    Ok(String::from_utf8_lossy(&bytes).trim().to_string())
}

/// Paths of the non-directory entries directly under `dir`, sorted by name
pub fn list_file(dir: &str) -> Result<Vec<String>, TemplateError> {
    let io_err = |e: std::io::Error| TemplateError::Io {
        func: "ListFile",
        path: dir.to_string(),
        source: Arc::new(e),
    };

    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        if !entry.file_type().map_err(io_err)?.is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();

    Ok(names
        .into_iter()
        .map(|name| Path::new(dir).join(name).to_string_lossy().into_owned())
        .collect())
}

/// One element picked uniformly at random
pub fn random_choice<R: Rng + ?Sized>(values: &[String], rng: &mut R) -> Result<String, TemplateError> {
    values
        .choose(rng)
        .cloned()
        .ok_or_else(|| empty_values("RandomChoice"))
}

/// A random non-empty contiguous run of `values`
///
/// Two bounds are drawn independently. When they coincide the run is widened
/// by one: forwards at index 0, backwards otherwise.
pub fn random_slice<R: Rng + ?Sized>(
    values: &[String],
    rng: &mut R,
) -> Result<Vec<String>, TemplateError> {
    if values.is_empty() {
        return Err(empty_values("RandomSlice"));
    }

    let mut start = rng.gen_range(0..values.len());
    let mut end = rng.gen_range(0..values.len());
    if start > end {
        std::mem::swap(&mut start, &mut end);
    } else if start == end {
        if start == 0 {
            end += 1;
        } else {
            start -= 1;
        }
    }

    Ok(values[start..end].to_vec())
}

/// `k` elements drawn without replacement, kept in their input order
pub fn random_slice_k<R: Rng + ?Sized>(
    values: &[String],
    k: i64,
    rng: &mut R,
) -> Result<Vec<String>, TemplateError> {
    let k = usize::try_from(k)
        .ok()
        .filter(|k| *k <= values.len())
        .ok_or_else(|| TemplateError::InvalidValue {
            func: "RandomSliceK",
            message: format!("k must be in [0, {}], got {k}", values.len()),
        })?;

    let mut picked = index::sample(rng, values.len(), k).into_vec();
    picked.sort_unstable();

    Ok(picked.into_iter().map(|i| values[i].clone()).collect())
}

/// A random integer in `[low, high)`, as decimal text
pub fn random_int<R: Rng + ?Sized>(low: i64, high: i64, rng: &mut R) -> Result<String, TemplateError> {
    if low < 0 || high < 1 {
        return Err(TemplateError::InvalidValue {
            func: "RandomInt",
            message: "must be m > n >= 0".into(),
        });
    }
    if high <= low {
        return Err(TemplateError::InvalidValue {
            func: "RandomInt",
            message: "m must > n".into(),
        });
    }

    Ok(rng.gen_range(low..high).to_string())
}

/// A uniformly shuffled copy of `values`
pub fn shuffle<R: Rng + ?Sized>(values: &[String], rng: &mut R) -> Vec<String> {
    let mut shuffled = values.to_vec();
    shuffled.shuffle(rng);
    shuffled
}

/// `values[request_number % len]`
pub fn round_robin(values: &[String], request_number: u64) -> Result<String, TemplateError> {
    if values.is_empty() {
        return Err(empty_values("RoundRobin"));
    }
    let index = (request_number % values.len() as u64) as usize;
    Ok(values[index].clone())
}

/// Decimal strings from `start` (inclusive) to `end` (exclusive) by `step`
///
/// Empty when `step <= 0` or `end < start`.
pub fn range(start: i64, end: i64, step: i64) -> Vec<String> {
    if step <= 0 || end < start {
        return Vec::new();
    }

    let mut out = Vec::new();
    let mut current = start;
    while current < end {
        out.push(current.to_string());
        match current.checked_add(step) {
            Some(next) => current = next,
            None => break,
        }
    }
    out
}

/// Parse decimal text as an integer
pub fn to_int(text: &str) -> Result<i64, TemplateError> {
    text.parse().map_err(|e| TemplateError::Format {
        func: "ToInt",
        message: format!("parsing {text:?}: {e}"),
    })
}

/// Split on every occurrence of `sep`; an empty separator splits into characters
pub fn split(s: &str, sep: &str) -> Vec<String> {
    if sep.is_empty() {
        return s.chars().map(String::from).collect();
    }
    s.split(sep).map(String::from).collect()
}

/// Standard base64 with padding
pub fn b64_encode(data: &str) -> String {
    STANDARD.encode(data.as_bytes())
}

/// Inverse of [`b64_encode`]
pub fn b64_decode(data: &str) -> Result<String, TemplateError> {
    let bytes = STANDARD.decode(data).map_err(|e| TemplateError::Format {
        func: "B64Decode",
        message: e.to_string(),
    })?;
    String::from_utf8(bytes).map_err(|e| TemplateError::Format {
        func: "B64Decode",
        message: e.to_string(),
    })
}
