// ==============================================================================
// output.rs - Feature and Prediction Output
// ==============================================================================
// Description: Parquet persistence of feature tables and gzipped TSV predictions
// Author: Matt Barham
// Created: 2026-09-18
// Modified: 2026-10-11
// Version: 1.1.0
// ==============================================================================
// Parquet layout:
//   chrom Utf8, end Int64, [id, ref, alt Utf8 for variant matrices],
//   integer-kind columns Int64 (nullable), float-kind columns Float64 (nullable)
//   key/value metadata: created_by, created_at (RFC 3339), organ (organ tables)
// Predictions: gzip TSV with header chrom, pos, ref, alt, {organ}_{model}
// ==============================================================================

use anyhow::{anyhow, bail, Context, Result};
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use flate2::write::GzEncoder;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::file::metadata::KeyValue;
use parquet::file::properties::WriterProperties;

use crate::models::{ColumnKind, FeatureColumn, FeatureMatrix, KeyedFeatureTable, Variant, VariantKey};
use crate::predictor::PredictionTable;

const VARIANT_COLUMNS: [&str; 5] = ["chrom", "end", "id", "ref", "alt"];

fn feature_field(column: &FeatureColumn) -> Field {
    let data_type = match column.kind {
        ColumnKind::Integer => DataType::Int64,
        ColumnKind::Float => DataType::Float64,
    };
    Field::new(&column.name, data_type, true)
}

fn feature_array(column: &FeatureColumn) -> ArrayRef {
    match column.kind {
        ColumnKind::Integer => Arc::new(Int64Array::from(
            column.values.iter().map(|v| v.map(|x| x as i64)).collect::<Vec<_>>(),
        )),
        ColumnKind::Float => Arc::new(Float64Array::from(column.values.clone())),
    }
}

fn string_array<'a>(values: impl Iterator<Item = &'a str>) -> ArrayRef {
    Arc::new(StringArray::from(values.collect::<Vec<_>>()))
}

fn position_array(values: impl Iterator<Item = u64>) -> ArrayRef {
    Arc::new(Int64Array::from(values.map(|v| v as i64).collect::<Vec<_>>()))
}

/// Write one record batch with Snappy compression and provenance metadata
fn write_batch(
    path: &Path,
    fields: Vec<Field>,
    arrays: Vec<ArrayRef>,
    organ: Option<&str>,
) -> Result<()> {
    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), arrays)
        .context("Failed to create Arrow RecordBatch")?;

    let mut metadata = vec![
        KeyValue::new(
            "created_by".to_string(),
            format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        ),
        KeyValue::new("created_at".to_string(), chrono::Utc::now().to_rfc3339()),
    ];
    if let Some(organ) = organ {
        metadata.push(KeyValue::new("organ".to_string(), organ.to_string()));
    }

    let file = File::create(path)
        .with_context(|| format!("Failed to create Parquet file {:?}", path))?;
    let props = WriterProperties::builder()
        .set_compression(parquet::basic::Compression::SNAPPY)
        .set_key_value_metadata(Some(metadata))
        .build();

    let mut writer = ArrowWriter::try_new(file, schema, Some(props))
        .context("Failed to create Parquet writer")?;
    writer.write(&batch).context("Failed to write Parquet data")?;
    writer.close().context("Failed to close Parquet writer")?;

    Ok(())
}

/// Persist the per-variant feature matrix
pub fn write_feature_matrix(path: impl AsRef<Path>, matrix: &FeatureMatrix) -> Result<()> {
    let path = path.as_ref();
    let variants = &matrix.variants;

    let mut fields = vec![
        Field::new("chrom", DataType::Utf8, false),
        Field::new("end", DataType::Int64, false),
        Field::new("id", DataType::Utf8, false),
        Field::new("ref", DataType::Utf8, false),
        Field::new("alt", DataType::Utf8, false),
    ];
    let mut arrays = vec![
        string_array(variants.iter().map(|v| v.chrom.as_str())),
        position_array(variants.iter().map(|v| v.end)),
        string_array(variants.iter().map(|v| v.id.as_str())),
        string_array(variants.iter().map(|v| v.ref_allele.as_str())),
        string_array(variants.iter().map(|v| v.alt_allele.as_str())),
    ];
    fields.extend(matrix.columns.iter().map(feature_field));
    arrays.extend(matrix.columns.iter().map(feature_array));

    write_batch(path, fields, arrays, None)?;
    info!(
        "Wrote feature matrix to {:?}: {} variants, {} feature columns",
        path,
        matrix.len(),
        matrix.columns.len()
    );
    Ok(())
}

/// Persist a position-keyed table (organ-specific features)
pub fn write_keyed_table(
    path: impl AsRef<Path>,
    table: &KeyedFeatureTable,
    organ: Option<&str>,
) -> Result<()> {
    let path = path.as_ref();

    let mut fields = vec![
        Field::new("chrom", DataType::Utf8, false),
        Field::new("end", DataType::Int64, false),
    ];
    let mut arrays = vec![
        string_array(table.keys.iter().map(|k| k.chrom.as_str())),
        position_array(table.keys.iter().map(|k| k.end)),
    ];
    fields.extend(table.columns.iter().map(feature_field));
    arrays.extend(table.columns.iter().map(feature_array));

    write_batch(path, fields, arrays, organ)?;
    info!(
        "Wrote {} rows x {} columns to {:?}",
        table.len(),
        table.columns.len(),
        path
    );
    Ok(())
}

/// Columns of a Parquet file, concatenated across record batches
struct ParquetColumns {
    fields: Vec<Field>,
    batches: Vec<RecordBatch>,
}

impl ParquetColumns {
    fn read(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .with_context(|| format!("Failed to read Parquet metadata from {:?}", path))?;
        let fields = builder
            .schema()
            .fields()
            .iter()
            .map(|f| f.as_ref().clone())
            .collect();
        let reader = builder.build().context("Failed to build Parquet reader")?;
        let batches = reader
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context(|| format!("Failed to read record batches from {:?}", path))?;

        Ok(Self { fields, batches })
    }

    fn has(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name() == name)
    }

    fn cast_all(&self, name: &str, to: &DataType) -> Result<Vec<ArrayRef>> {
        self.batches
            .iter()
            .map(|batch| {
                let array = batch
                    .column_by_name(name)
                    .ok_or_else(|| anyhow!("Missing column '{}'", name))?;
                cast(array, to).with_context(|| format!("Column '{}' cannot be read as {}", name, to))
            })
            .collect()
    }

    fn strings(&self, name: &str) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for array in self.cast_all(name, &DataType::Utf8)? {
            let array = array
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| anyhow!("Column '{}' is not a string column", name))?;
            for i in 0..array.len() {
                if array.is_null(i) {
                    bail!("Column '{}' has a null at row {}", name, out.len());
                }
                out.push(array.value(i).to_string());
            }
        }
        Ok(out)
    }

    fn positions(&self, name: &str) -> Result<Vec<u64>> {
        let mut out = Vec::new();
        for array in self.cast_all(name, &DataType::Int64)? {
            let array = array
                .as_any()
                .downcast_ref::<Int64Array>()
                .ok_or_else(|| anyhow!("Column '{}' is not an integer column", name))?;
            for value in array.iter() {
                match value {
                    Some(v) if v >= 0 => out.push(v as u64),
                    other => bail!("Invalid position {:?} in column '{}'", other, name),
                }
            }
        }
        Ok(out)
    }

    /// Every non-key column as a feature column; Int64 stays integer, the rest become float
    fn features(&self, key_columns: &[&str]) -> Result<Vec<FeatureColumn>> {
        let mut columns = Vec::new();
        for field in &self.fields {
            if key_columns.iter().any(|k| *k == field.name()) {
                continue;
            }
            let kind = match field.data_type() {
                DataType::Int64 => ColumnKind::Integer,
                _ => ColumnKind::Float,
            };
            let mut values = Vec::new();
            for array in self.cast_all(field.name(), &DataType::Float64)? {
                let array = array
                    .as_any()
                    .downcast_ref::<Float64Array>()
                    .ok_or_else(|| anyhow!("Column '{}' is not numeric", field.name()))?;
                values.extend(array.iter());
            }
            columns.push(FeatureColumn::new(field.name().clone(), kind, values));
        }
        Ok(columns)
    }
}

/// Load a feature matrix written by `write_feature_matrix`
pub fn read_feature_matrix(path: impl AsRef<Path>) -> Result<FeatureMatrix> {
    let path = path.as_ref();
    let data = ParquetColumns::read(path)?;

    let chroms = data.strings("chrom")?;
    let ends = data.positions("end")?;
    let ids = if data.has("id") {
        data.strings("id")?
    } else {
        vec![".".to_string(); chroms.len()]
    };
    let refs = data.strings("ref")?;
    let alts = data.strings("alt")?;

    let variants = chroms
        .into_iter()
        .zip(ends)
        .zip(ids)
        .zip(refs.into_iter().zip(alts))
        .map(|(((chrom, end), id), (ref_allele, alt_allele))| Variant {
            chrom,
            end,
            id,
            ref_allele,
            alt_allele,
        })
        .collect();

    let mut matrix = FeatureMatrix::new(variants);
    for column in data.features(&VARIANT_COLUMNS)? {
        matrix.push_column(column);
    }

    info!(
        "Loaded feature matrix from {:?}: {} variants, {} feature columns",
        path,
        matrix.len(),
        matrix.columns.len()
    );
    Ok(matrix)
}

/// Load a position-keyed table written by `write_keyed_table`
pub fn read_keyed_table(path: impl AsRef<Path>) -> Result<KeyedFeatureTable> {
    let path = path.as_ref();
    let data = ParquetColumns::read(path)?;

    let keys = data
        .strings("chrom")?
        .into_iter()
        .zip(data.positions("end")?)
        .map(|(chrom, end)| VariantKey::new(chrom, end))
        .collect();

    let mut table = KeyedFeatureTable::new(keys);
    for column in data.features(&VARIANT_COLUMNS[..2])? {
        table.push_column(column);
    }

    info!("Loaded {} rows x {} columns from {:?}", table.len(), table.columns.len(), path);
    Ok(table)
}

/// File-level key/value metadata of a Parquet file
pub fn read_parquet_metadata(path: impl AsRef<Path>) -> Result<HashMap<String, String>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .with_context(|| format!("Failed to read Parquet metadata from {:?}", path))?;

    Ok(builder
        .metadata()
        .file_metadata()
        .key_value_metadata()
        .map(|kvs| {
            kvs.iter()
                .filter_map(|kv| kv.value.clone().map(|v| (kv.key.clone(), v)))
                .collect()
        })
        .unwrap_or_default())
}

/// Write predictions as gzip-compressed TSV
pub fn write_predictions(path: impl AsRef<Path>, table: &PredictionTable) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("Failed to create predictions file {:?}", path))?;
    let encoder = GzEncoder::new(file, flate2::Compression::default());
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(encoder);

    writer
        .write_record(["chrom", "pos", "ref", "alt", table.column.as_str()])
        .context("Failed to write predictions header")?;
    for (variant, value) in table.variants.iter().zip(&table.values) {
        let pos = variant.end.to_string();
        let value = value.to_string();
        writer
            .write_record([
                variant.chrom.as_str(),
                pos.as_str(),
                variant.ref_allele.as_str(),
                variant.alt_allele.as_str(),
                value.as_str(),
            ])
            .context("Failed to write prediction row")?;
    }

    let encoder = writer
        .into_inner()
        .map_err(|e| anyhow!("Failed to flush predictions: {}", e.error()))?;
    encoder.finish().context("Failed to finish gzip stream")?;

    info!("Wrote {} predictions ({}) to {:?}", table.values.len(), table.column, path);
    Ok(())
}
