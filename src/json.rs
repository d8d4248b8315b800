//! The self-describing encoded form.
//!
//! Every operation encodes to a JSON object carrying a `"_ot"` tag of the
//! form `"<module>.<OP>"` — `values.SET`, `sequences.PATCH`, ... — plus the
//! operation's declared fields. Decoding dispatches through [`REGISTRY`],
//! which maps `(module, op)` pairs to their decoders, so an external
//! operation family can be checked against the same table.
//!
//! The encoding is *canonical*: objects serialize with sorted keys, splices
//! and element-wise applications encode as the `PATCH` they normalize to,
//! and `decode(encode(op)) == op` holds structurally for every operation
//! the algebra produces. The conflictless tie-breaking rules rely on this:
//! the total order over operations is the byte order of this form.
//!
//! Two document values have no native JSON shape and use escape objects:
//! the MISSING sentinel (`{"_missing": true}`) and non-finite floats
//! (`{"_float": "NaN"}` etc.).

use crate::document::Document;
use crate::errors::DecodeError;
use crate::ops::sequences::{Hunk, Map, Move, Patch};
use crate::ops::values::{Math, MathOperator, Set};
use crate::ops::Op;
use serde_json::{json, Map as JsonMap, Number, Value};

/// Encodes a document as plain JSON (with the two escape objects described
/// in the module docs).
pub fn encode_document(doc: &Document) -> Value {
    match doc {
        Document::Missing => json!({ "_missing": true }),
        Document::Null => Value::Null,
        Document::Bool(b) => Value::Bool(*b),
        Document::Int(n) => Value::Number((*n).into()),
        Document::Float(x) => match Number::from_f64(*x) {
            Some(n) => Value::Number(n),
            // JSON has no NaN or infinities
            None => json!({ "_float": x.to_string() }),
        },
        Document::String(s) => Value::String(s.clone()),
        Document::Array(items) => Value::Array(items.iter().map(encode_document).collect()),
        Document::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), encode_document(v)))
                .collect(),
        ),
    }
}

/// Decodes a document from its JSON form. Total: every JSON value is a
/// document.
pub fn decode_document(value: &Value) -> Document {
    match value {
        Value::Null => Document::Null,
        Value::Bool(b) => Document::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Document::Int(i),
            None => Document::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => Document::String(s.clone()),
        Value::Array(items) => Document::Array(items.iter().map(decode_document).collect()),
        Value::Object(map) => {
            if map.len() == 1 {
                if let Some(Value::Bool(true)) = map.get("_missing") {
                    return Document::Missing;
                }
                if let Some(Value::String(repr)) = map.get("_float") {
                    if let Ok(x) = repr.parse::<f64>() {
                        return Document::Float(x);
                    }
                }
            }
            Document::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), decode_document(v)))
                    .collect(),
            )
        }
    }
}

/// Encodes an operation into its self-describing form.
pub fn encode(op: &Op) -> Value {
    let kind = op.kind();
    let tag = format!("{}.{}", kind.module(), kind.name());
    match op {
        Op::NoOp => json!({ "_ot": tag }),
        Op::Set(set) => json!({ "_ot": tag, "value": encode_document(&set.value) }),
        Op::Math(math) => json!({
            "_ot": tag,
            "operator": math.operator.tag(),
            "operand": encode_document(&math.operand),
        }),
        Op::Patch(patch) => json!({
            "_ot": tag,
            "hunks": patch
                .hunks()
                .iter()
                .map(|hunk| {
                    json!({
                        "offset": hunk.offset,
                        "length": hunk.length,
                        "op": encode(&hunk.op),
                    })
                })
                .collect::<Vec<_>>(),
        }),
        Op::Move(mv) => json!({
            "_ot": tag,
            "offset": mv.offset,
            "count": mv.count,
            "new_offset": mv.new_offset,
        }),
        Op::Map(map) => json!({ "_ot": tag, "op": encode(&map.op) }),
    }
}

/// A decoder for one `(module, op)` tag pair.
pub type Decoder = fn(&JsonMap<String, Value>) -> Result<Op, DecodeError>;

/// The decoding table. External operation families extend the same shape
/// with their own module tag.
pub static REGISTRY: &[((&str, &str), Decoder)] = &[
    (("values", "NOP"), decode_noop),
    (("values", "SET"), decode_set),
    (("values", "MATH"), decode_math),
    (("sequences", "PATCH"), decode_patch),
    (("sequences", "MOVE"), decode_move),
    (("sequences", "MAP"), decode_map),
];

/// Decodes an operation from its self-describing form.
pub fn decode(value: &Value) -> Result<Op, DecodeError> {
    let fields = value.as_object().ok_or(DecodeError::NotAnObject)?;
    let tag = fields
        .get("_ot")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingField("_ot"))?;
    let (module, name) = tag
        .split_once('.')
        .ok_or_else(|| DecodeError::UnknownTag(tag.to_string()))?;
    let decoder = REGISTRY
        .iter()
        .find(|((m, n), _)| *m == module && *n == name)
        .map(|(_, decoder)| decoder)
        .ok_or_else(|| DecodeError::UnknownTag(tag.to_string()))?;
    decoder(fields)
}

fn field<'a>(
    fields: &'a JsonMap<String, Value>,
    name: &'static str,
) -> Result<&'a Value, DecodeError> {
    fields.get(name).ok_or(DecodeError::MissingField(name))
}

fn usize_field(fields: &JsonMap<String, Value>, name: &'static str) -> Result<usize, DecodeError> {
    field(fields, name)?
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or(DecodeError::BadField(name))
}

fn decode_noop(_fields: &JsonMap<String, Value>) -> Result<Op, DecodeError> {
    Ok(Op::NoOp)
}

fn decode_set(fields: &JsonMap<String, Value>) -> Result<Op, DecodeError> {
    Ok(Op::Set(Set {
        value: decode_document(field(fields, "value")?),
    }))
}

fn decode_math(fields: &JsonMap<String, Value>) -> Result<Op, DecodeError> {
    let operator = field(fields, "operator")?
        .as_str()
        .and_then(MathOperator::from_tag)
        .ok_or(DecodeError::BadField("operator"))?;
    let operand = decode_document(field(fields, "operand")?);
    Math::new(operator, operand)
        .map(Op::Math)
        .map_err(|_| DecodeError::BadField("operand"))
}

fn decode_patch(fields: &JsonMap<String, Value>) -> Result<Op, DecodeError> {
    let hunks = field(fields, "hunks")?
        .as_array()
        .ok_or(DecodeError::BadField("hunks"))?;
    let mut decoded = Vec::with_capacity(hunks.len());
    for hunk in hunks {
        let hunk = hunk.as_object().ok_or(DecodeError::BadField("hunks"))?;
        decoded.push(Hunk {
            offset: usize_field(hunk, "offset")?,
            length: usize_field(hunk, "length")?,
            op: decode(field(hunk, "op")?)?,
        });
    }
    Ok(Op::Patch(Box::new(Patch::new(decoded))))
}

fn decode_move(fields: &JsonMap<String, Value>) -> Result<Op, DecodeError> {
    Ok(Op::Move(Move {
        offset: usize_field(fields, "offset")?,
        count: usize_field(fields, "count")?,
        new_offset: usize_field(fields, "new_offset")?,
    }))
}

fn decode_map(fields: &JsonMap<String, Value>) -> Result<Op, DecodeError> {
    Ok(Op::Map(Map {
        op: Box::new(decode(field(fields, "op")?)?),
    }))
}
