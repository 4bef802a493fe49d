use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::Serialize;
use tiberius::{ColumnData, FromSql};

use crate::error::AppResult;

/// One normalized cell of a diagnostic result set.
///
/// Serializes untagged: numbers that must keep their textual form (decimal,
/// money, float) and temporal values travel as strings, everything else as
/// the matching JSON scalar.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Int(i64),
    Bool(bool),
    Text(String),
    Number(String),
    DateTime(String),
    Duration(String),
    Binary(String),
}

impl CellValue {
    pub fn from_column_data(data: &ColumnData<'static>) -> AppResult<Self> {
        let v = match data {
            ColumnData::U8(v) => v.map(|x| CellValue::Int(x.into())),
            ColumnData::I16(v) => v.map(|x| CellValue::Int(x.into())),
            ColumnData::I32(v) => v.map(|x| CellValue::Int(x.into())),
            ColumnData::I64(v) => v.map(CellValue::Int),
            ColumnData::F32(v) => v.map(|x| CellValue::Number(x.to_string())),
            ColumnData::F64(v) => v.map(|x| CellValue::Number(x.to_string())),
            ColumnData::Bit(v) => v.map(CellValue::Bool),
            ColumnData::String(v) => v.as_ref().map(|s| CellValue::Text(s.to_string())),
            ColumnData::Guid(v) => v.map(|g| CellValue::Text(g.to_string())),
            ColumnData::Binary(v) => v.as_ref().map(|b| CellValue::Binary(format_binary(b))),
            ColumnData::Xml(v) => v
                .as_ref()
                .map(|x| CellValue::Text(x.clone().into_owned().into_string())),
            ColumnData::Numeric(v) => v
                .as_ref()
                .map(|n| CellValue::Number(format_numeric(n.value(), n.scale()))),
            ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
                NaiveDateTime::from_sql(data)?.map(|dt| CellValue::DateTime(format_datetime(&dt)))
            }
            ColumnData::Date(_) => NaiveDate::from_sql(data)?
                .map(|d| CellValue::DateTime(format_datetime(&d.and_time(NaiveTime::MIN)))),
            ColumnData::Time(_) => {
                NaiveTime::from_sql(data)?.map(|t| CellValue::Duration(format_duration(&t)))
            }
            ColumnData::DateTimeOffset(_) => DateTime::<FixedOffset>::from_sql(data)?
                .map(|dt| CellValue::DateTime(format_datetime_offset(&dt))),
        };
        Ok(v.unwrap_or(CellValue::Null))
    }
}

/// `YYYY-MM-DD HH:MM:SS.mmm`, 24-hour clock, no zone.
pub fn format_datetime(dt: &NaiveDateTime) -> String {
    dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

pub fn format_datetime_offset(dt: &DateTime<FixedOffset>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S%.3f %:z").to_string()
}

/// Elapsed-time text: `HH:MM:SS`, with seven fractional digits only when the
/// value has a sub-second part.
pub fn format_duration(t: &NaiveTime) -> String {
    let base = t.format("%H:%M:%S").to_string();
    match t.nanosecond() % 1_000_000_000 {
        0 => base,
        nanos => format!("{base}.{:07}", nanos / 100),
    }
}

/// Exact decimal text at the column scale (`123.4500` stays `123.4500`).
/// Works on the raw 128-bit value so numeric(38, s) never loses digits.
pub fn format_numeric(value: i128, scale: u8) -> String {
    let sign = if value < 0 { "-" } else { "" };
    let digits = value.unsigned_abs().to_string();
    let scale = usize::from(scale);
    if scale == 0 {
        return format!("{sign}{digits}");
    }
    let padded = format!("{digits:0>width$}", width = scale + 1);
    let (int, frac) = padded.split_at(padded.len() - scale);
    format!("{sign}{int}.{frac}")
}

pub fn format_binary(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode_upper(bytes))
}
