//! TYBR CLI - Command-line tool for the value-graph codec
//!
//! This binary provides command-line interfaces for:
//! - pack: encode a JSON document → .tybr
//! - unpack: decode .tybr → JSON (for the JSON-expressible subset)
//! - inspect: summarize the structure of a .tybr blob

use clap::{Parser, Subcommand};
use serde_json as json;
use std::collections::HashSet;
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use tybr_codec::value::{ObjectValue, PropertySlot, Value};
use tybr_codec::{Codec, CodecOpts};
use tybr_format::constants::{HEADER_LEN, VERSION};

#[derive(Parser)]
#[command(name = "tybr")]
#[command(about = "TYBR value-graph codec CLI tool")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode a JSON document into the binary format
    Pack {
        /// Input JSON file
        input: PathBuf,
        /// Output file (.tybr)
        #[arg(short, long)]
        output: PathBuf,
        /// Disable reference deduplication
        #[arg(long)]
        no_dedup: bool,
        /// Disable packed numeric arrays
        #[arg(long)]
        no_pack: bool,
    },
    /// Decode a binary blob back into JSON
    Unpack {
        /// Input file (.tybr)
        input: PathBuf,
        /// Output JSON file
        #[arg(short, long)]
        output: PathBuf,
        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },
    /// Summarize the structure of a binary blob
    Inspect {
        /// Input file (.tybr)
        input: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Pack {
            input,
            output,
            no_dedup,
            no_pack,
        } => handle_pack(input, output, no_dedup, no_pack),
        Commands::Unpack {
            input,
            output,
            pretty,
        } => handle_unpack(input, output, pretty),
        Commands::Inspect { input } => handle_inspect(input),
    }
}

fn handle_pack(
    input: PathBuf,
    output: PathBuf,
    no_dedup: bool,
    no_pack: bool,
) -> Result<(), Box<dyn Error>> {
    let text = fs::read_to_string(&input)?;
    let document: json::Value = json::from_str(&text)?;
    let value = json_to_value(&document);

    let opts = CodecOpts {
        deduplication: !no_dedup,
        packed_arrays: !no_pack,
        ..CodecOpts::default()
    };
    let bytes = Codec::new(opts).serialize(&value)?;
    fs::write(&output, &bytes)?;

    println!(
        "packed {} -> {} ({} bytes)",
        input.display(),
        output.display(),
        bytes.len()
    );
    Ok(())
}

fn handle_unpack(input: PathBuf, output: PathBuf, pretty: bool) -> Result<(), Box<dyn Error>> {
    let bytes = fs::read(&input)?;
    let value = Codec::default().deserialize(&bytes)?;
    let document = value_to_json(&value)?;

    let text = if pretty {
        json::to_string_pretty(&document)?
    } else {
        json::to_string(&document)?
    };
    fs::write(&output, text)?;

    println!("unpacked {} -> {}", input.display(), output.display());
    Ok(())
}

fn handle_inspect(input: PathBuf) -> Result<(), Box<dyn Error>> {
    let bytes = fs::read(&input)?;
    let value = Codec::default().deserialize(&bytes)?;

    let mut summary = Summary::default();
    summary.walk(&value);

    println!("file:     {}", input.display());
    println!("size:     {} bytes ({} payload)", bytes.len(), bytes.len() - HEADER_LEN);
    println!("version:  {}", VERSION);
    println!("root:     {}", kind_name(&value));
    println!(
        "values:   {} total ({} containers, {} strings, {} numbers)",
        summary.total, summary.containers, summary.strings, summary.numbers
    );
    if summary.buffers > 0 || summary.views > 0 {
        println!("binary:   {} buffers, {} views", summary.buffers, summary.views);
    }
    Ok(())
}

#[derive(Default)]
struct Summary {
    total: usize,
    containers: usize,
    strings: usize,
    numbers: usize,
    buffers: usize,
    views: usize,
    visited: HashSet<usize>,
}

impl Summary {
    fn walk(&mut self, value: &Value) {
        if let Some(ptr) = value.heap_id() {
            if !self.visited.insert(ptr) {
                return;
            }
        }
        self.total += 1;
        match value {
            Value::String(_) => self.strings += 1,
            Value::Number(_) => self.numbers += 1,
            Value::Buffer(_) => self.buffers += 1,
            Value::View(_) => self.views += 1,
            Value::Array(rc) => {
                self.containers += 1;
                for element in rc.borrow().elements.iter().flatten() {
                    self.walk(element);
                }
            }
            Value::Object(rc) => {
                self.containers += 1;
                for (_, prop) in &rc.borrow().properties {
                    if let PropertySlot::Data(v) = &prop.slot {
                        self.walk(v);
                    }
                }
            }
            Value::Map(rc) => {
                self.containers += 1;
                for (k, v) in &rc.borrow().entries {
                    self.walk(k);
                    self.walk(v);
                }
            }
            Value::Set(rc) => {
                self.containers += 1;
                for v in &rc.borrow().entries {
                    self.walk(v);
                }
            }
            Value::Error(rc) => {
                for v in &rc.borrow().errors {
                    self.walk(v);
                }
            }
            _ => {}
        }
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Undefined => "undefined",
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::BigInt(_) => "bigint",
        Value::String(_) => "string",
        Value::Symbol(_) => "symbol",
        Value::Function(_) => "function",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
        Value::Map(_) => "map",
        Value::Set(_) => "set",
        Value::Date(_) => "date",
        Value::RegExp(_) => "regexp",
        Value::Error(_) => "error",
        Value::Buffer(_) => "buffer",
        Value::View(_) => "view",
        Value::Blob(_) => "blob",
        Value::File(_) => "file",
    }
}

fn json_to_value(document: &json::Value) -> Value {
    match document {
        json::Value::Null => Value::Null,
        json::Value::Bool(b) => Value::Bool(*b),
        json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        json::Value::String(s) => Value::string(s),
        json::Value::Array(items) => Value::array(items.iter().map(json_to_value).collect()),
        json::Value::Object(map) => {
            let mut object = ObjectValue::default();
            for (key, item) in map {
                object.set(key, json_to_value(item));
            }
            Value::object(object)
        }
    }
}

fn value_to_json(value: &Value) -> Result<json::Value, Box<dyn Error>> {
    let mut on_path = HashSet::new();
    json_from_value(value, &mut on_path)
}

fn json_from_value(
    value: &Value,
    on_path: &mut HashSet<usize>,
) -> Result<json::Value, Box<dyn Error>> {
    if let Some(ptr) = value.heap_id() {
        if !on_path.insert(ptr) {
            return Err("cyclic graphs are not representable in JSON".into());
        }
    }
    let result = match value {
        Value::Undefined | Value::Null => Ok(json::Value::Null),
        Value::Bool(b) => Ok(json::Value::Bool(*b)),
        Value::Number(x) => json::Number::from_f64(*x)
            .map(json::Value::Number)
            .ok_or_else(|| format!("number {} is not representable in JSON", x).into()),
        Value::String(s) => Ok(json::Value::String(s.to_string())),
        Value::Array(rc) => {
            let mut items = Vec::new();
            for element in &rc.borrow().elements {
                items.push(match element {
                    Some(v) => json_from_value(v, on_path)?,
                    None => json::Value::Null,
                });
            }
            Ok(json::Value::Array(items))
        }
        Value::Object(rc) => {
            let mut map = json::Map::new();
            for (key, prop) in &rc.borrow().properties {
                let key = key
                    .as_str()
                    .ok_or("symbol-keyed objects are not representable in JSON")?;
                if let PropertySlot::Data(v) = &prop.slot {
                    map.insert(key.to_string(), json_from_value(v, on_path)?);
                }
            }
            Ok(json::Value::Object(map))
        }
        other => Err(format!("{} values are not representable in JSON", kind_name(other)).into()),
    };
    if let Some(ptr) = value.heap_id() {
        on_path.remove(&ptr);
    }
    result
}
