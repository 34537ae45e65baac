//! Client-side ABI decoding of raw logs into a decoded-logs table.
//!
//! Indexed parameters come from topics, non-indexed ones from the data
//! payload. Indexed dynamic values (`string`, `bytes`, arrays, tuples) are
//! only present as their keccak hash, which is what the column holds.
//!
//! The decoded table has one column per event parameter, in declaration
//! order. `bool` parameters are `Boolean`; everything else is `Utf8`, with
//! integers in decimal so the assembler can coerce them losslessly.

use std::sync::Arc;

use alloy::dyn_abi::{DynSolType, DynSolValue};
use alloy::json_abi::Event;
use alloy::primitives::{Address, B256, I256, U256};
use arrow_array::{ArrayRef, BooleanArray, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema, SchemaRef};

use crate::error::{QueryError, Result};
use crate::query::HexOutput;
use crate::rows::LogRow;
use crate::table::{hex, hex_bytes};

#[derive(Debug, Clone)]
struct Param {
    name: String,
    ty: DynSolType,
    indexed: bool,
}

#[derive(Debug)]
enum Value {
    Text(String),
    Flag(bool),
}

#[derive(Debug)]
enum Column {
    Text(Vec<Option<String>>),
    Flag(Vec<Option<bool>>),
}

impl Column {
    fn push(&mut self, value: Option<Value>) {
        match (self, value) {
            (Self::Text(v), Some(Value::Text(s))) => v.push(Some(s)),
            (Self::Flag(v), Some(Value::Flag(b))) => v.push(Some(b)),
            (Self::Text(v), _) => v.push(None),
            (Self::Flag(v), _) => v.push(None),
        }
    }

    fn finish(self) -> ArrayRef {
        match self {
            Self::Text(v) => Arc::new(StringArray::from(v)),
            Self::Flag(v) => Arc::new(BooleanArray::from(v)),
        }
    }
}

/// Decodes logs of a single event.
#[derive(Debug, Clone)]
pub struct LogDecoder {
    selector: B256,
    params: Vec<Param>,
    schema: SchemaRef,
}

impl LogDecoder {
    /// Build a decoder from an event declaration such as
    /// `FundsSlashed(address indexed provider, uint256 amount)`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Decode`] if the declaration or one of its
    /// parameter types does not parse.
    pub fn new(signature: &str) -> Result<Self> {
        let event = Event::parse(signature)
            .map_err(|e| QueryError::Decode(format!("invalid event signature `{signature}`: {e}")))?;

        let params = event
            .inputs
            .iter()
            .enumerate()
            .map(|(i, input)| {
                let ty = DynSolType::parse(&input.selector_type()).map_err(|e| {
                    QueryError::Decode(format!("invalid type for `{}`: {e}", input.name))
                })?;
                let name = if input.name.is_empty() {
                    format!("param_{i}")
                } else {
                    input.name.clone()
                };
                Ok(Param {
                    name,
                    ty,
                    indexed: input.indexed,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let fields: Vec<Field> = params
            .iter()
            .map(|p| {
                let data_type = if p.ty == DynSolType::Bool {
                    DataType::Boolean
                } else {
                    DataType::Utf8
                };
                Field::new(p.name.as_str(), data_type, true)
            })
            .collect();

        Ok(Self {
            selector: event.selector(),
            params,
            schema: Arc::new(Schema::new(fields)),
        })
    }

    /// Schema of the decoded table.
    #[must_use]
    pub fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    /// Decode `logs` into one row each.
    ///
    /// A log that does not match the event becomes a row of nulls; the
    /// number of such rows is returned alongside the batch.
    ///
    /// # Errors
    ///
    /// Returns an error only if Arrow rejects the assembled columns.
    pub fn decode_batch(&self, logs: &[LogRow], mode: HexOutput) -> Result<(RecordBatch, usize)> {
        let mut columns: Vec<Column> = self
            .params
            .iter()
            .map(|p| {
                if p.ty == DynSolType::Bool {
                    Column::Flag(Vec::with_capacity(logs.len()))
                } else {
                    Column::Text(Vec::with_capacity(logs.len()))
                }
            })
            .collect();
        let mut failures = 0usize;

        for log in logs {
            match self.decode_one(log, mode) {
                Ok(values) => {
                    for (column, value) in columns.iter_mut().zip(values) {
                        column.push(Some(value));
                    }
                }
                Err(reason) => {
                    failures += 1;
                    tracing::debug!(
                        block = log.block_number,
                        log_index = log.log_index,
                        %reason,
                        "log decode failed"
                    );
                    for column in &mut columns {
                        column.push(None);
                    }
                }
            }
        }

        if failures > 0 {
            tracing::debug!(failures, total = logs.len(), "page logs failed to decode");
        }

        let arrays: Vec<ArrayRef> = columns.into_iter().map(Column::finish).collect();
        let batch = if arrays.is_empty() {
            RecordBatch::try_new_with_options(
                self.schema(),
                arrays,
                &arrow_array::RecordBatchOptions::new().with_row_count(Some(logs.len())),
            )?
        } else {
            RecordBatch::try_new(self.schema(), arrays)?
        };
        Ok((batch, failures))
    }

    fn decode_one(&self, log: &LogRow, mode: HexOutput) -> std::result::Result<Vec<Value>, String> {
        if log.topics.first() != Some(&self.selector) {
            return Err("topic0 does not match event selector".into());
        }

        let body_types: Vec<DynSolType> = self
            .params
            .iter()
            .filter(|p| !p.indexed)
            .map(|p| p.ty.clone())
            .collect();
        let data: &[u8] = log.data.as_ref().map_or(&[][..], |d| d.as_ref());
        let body = if body_types.is_empty() {
            Vec::new()
        } else {
            match DynSolType::Tuple(body_types).abi_decode_sequence(data) {
                Ok(DynSolValue::Tuple(values)) => values,
                Ok(other) => return Err(format!("unexpected body shape: {other:?}")),
                Err(e) => return Err(e.to_string()),
            }
        };

        let mut topics = log.topics.iter().skip(1);
        let mut body = body.into_iter();
        let mut values = Vec::with_capacity(self.params.len());
        for param in &self.params {
            let value = if param.indexed {
                let topic = topics.next().ok_or("missing indexed topic")?;
                topic_value(*topic, &param.ty, mode)
            } else {
                let value = body.next().ok_or("missing body value")?;
                match value {
                    DynSolValue::Bool(b) => Value::Flag(b),
                    other => Value::Text(render(&other, mode)),
                }
            };
            values.push(value);
        }
        Ok(values)
    }
}

fn topic_value(topic: B256, ty: &DynSolType, mode: HexOutput) -> Value {
    match ty {
        DynSolType::Address => Value::Text(hex(&Address::from_word(topic), mode)),
        DynSolType::Uint(_) => Value::Text(U256::from_be_bytes(topic.0).to_string()),
        DynSolType::Int(_) => Value::Text(I256::from_be_bytes(topic.0).to_string()),
        DynSolType::Bool => Value::Flag(topic.0.last().is_some_and(|b| *b != 0)),
        DynSolType::FixedBytes(size) => {
            Value::Text(hex_bytes(topic.get(..*size).unwrap_or(topic.as_slice()), mode))
        }
        _ => Value::Text(hex(&topic, mode)),
    }
}

fn render(value: &DynSolValue, mode: HexOutput) -> String {
    match value {
        DynSolValue::Address(a) => hex(a, mode),
        DynSolValue::Uint(v, _) => v.to_string(),
        DynSolValue::Int(v, _) => v.to_string(),
        DynSolValue::Bool(b) => b.to_string(),
        DynSolValue::FixedBytes(word, size) => {
            hex_bytes(word.get(..*size).unwrap_or(word.as_slice()), mode)
        }
        DynSolValue::Bytes(b) => hex_bytes(b, mode),
        DynSolValue::String(s) => s.clone(),
        DynSolValue::Array(values)
        | DynSolValue::FixedArray(values)
        | DynSolValue::Tuple(values) => {
            let inner: Vec<String> = values.iter().map(|v| render(v, mode)).collect();
            format!("[{}]", inner.join(","))
        }
        other => format!("{other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{Bytes, address, keccak256};
    use arrow_array::Array;

    use super::*;

    fn text(batch: &RecordBatch, column: &str, row: usize) -> Option<String> {
        let col = batch.column_by_name(column)?;
        let col = col.as_any().downcast_ref::<StringArray>()?;
        col.is_valid(row).then(|| col.value(row).to_owned())
    }

    fn word(value: u64) -> [u8; 32] {
        U256::from(value).to_be_bytes::<32>()
    }

    #[test]
    fn decodes_indexed_and_body_params() {
        let decoder = LogDecoder::new(
            "BidderRegistered(address indexed bidder, uint256 depositedAmount, uint256 windowNumber)",
        )
        .expect("valid signature");
        let bidder = address!("00000000000000000000000000000000000000ab");

        let mut data = word(1_000_000_000_000_000_000).to_vec();
        data.extend_from_slice(&word(42));
        let log = LogRow {
            topics: vec![keccak256("BidderRegistered(address,uint256,uint256)"), bidder.into_word()],
            data: Some(Bytes::from(data)),
            ..LogRow::default()
        };

        let (batch, failures) = decoder.decode_batch(&[log], HexOutput::Prefixed).expect("decodes");
        assert_eq!(failures, 0, "no failures");
        assert_eq!(batch.num_rows(), 1, "one row");
        assert_eq!(text(&batch, "bidder", 0), Some(format!("{bidder:#x}")), "indexed address");
        assert_eq!(
            text(&batch, "depositedAmount", 0).as_deref(),
            Some("1000000000000000000"),
            "decimal amount"
        );
        assert_eq!(text(&batch, "windowNumber", 0).as_deref(), Some("42"), "window");
    }

    #[test]
    fn decodes_dynamic_body_and_bools() {
        let decoder =
            LogDecoder::new("Note(bytes32 indexed id, string memo, bool flag)").expect("valid");
        let data = DynSolValue::Tuple(vec![
            DynSolValue::String("hello".into()),
            DynSolValue::Bool(true),
        ])
        .abi_encode_params();
        let id = B256::repeat_byte(0x07);
        let log = LogRow {
            topics: vec![keccak256("Note(bytes32,string,bool)"), id],
            data: Some(Bytes::from(data)),
            ..LogRow::default()
        };

        let (batch, failures) = decoder.decode_batch(&[log], HexOutput::NonPrefixed).expect("ok");
        assert_eq!(failures, 0, "no failures");
        assert_eq!(text(&batch, "id", 0), Some("07".repeat(32)), "fixed bytes");
        assert_eq!(text(&batch, "memo", 0).as_deref(), Some("hello"), "string");
        let flags = batch
            .column_by_name("flag")
            .and_then(|c| c.as_any().downcast_ref::<BooleanArray>())
            .expect("boolean column");
        assert!(flags.value(0), "bool");
    }

    #[test]
    fn undecodable_logs_become_null_rows() {
        let decoder = LogDecoder::new("FundsSlashed(address indexed provider, uint256 amount)")
            .expect("valid");
        let topic0 = keccak256("FundsSlashed(address,uint256)");
        let good = LogRow {
            topics: vec![topic0, Address::ZERO.into_word()],
            data: Some(Bytes::from(word(5).to_vec())),
            ..LogRow::default()
        };
        let truncated = LogRow {
            topics: vec![topic0, Address::ZERO.into_word()],
            data: Some(Bytes::from_static(&[0x01])),
            ..LogRow::default()
        };
        let wrong_event = LogRow {
            topics: vec![B256::ZERO],
            ..LogRow::default()
        };

        let (batch, failures) = decoder
            .decode_batch(&[good, truncated, wrong_event], HexOutput::Prefixed)
            .expect("decodes");
        assert_eq!(batch.num_rows(), 3, "row per log");
        assert_eq!(failures, 2, "two failures");
        assert_eq!(text(&batch, "amount", 0).as_deref(), Some("5"), "good row");
        assert_eq!(text(&batch, "amount", 1), None, "truncated row is null");
        assert_eq!(text(&batch, "provider", 2), None, "foreign row is null");
    }

    #[test]
    fn unnamed_params_get_positional_names() {
        let decoder = LogDecoder::new("Anon(uint256, address indexed)").expect("valid");
        let names: Vec<String> = decoder
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        assert_eq!(names, ["param_0", "param_1"], "positional names");
    }

    #[test]
    fn rejects_malformed_signature() {
        assert!(
            matches!(LogDecoder::new("Broken(uint256"), Err(QueryError::Decode(_))),
            "malformed"
        );
    }
}
