//! The in-memory patient table and the loaders that produce it.
//!
//! A [`Dataset`] is built once at startup and handed out by cheap clone. The
//! column kinds are fixed at construction so the summary code never has to
//! inspect dtypes per request.

use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use calamine::{open_workbook_auto, DataType as Cell, Reader};
use log::{debug, info};
use polars::prelude::*;
use polars_io::parquet::ParquetWriter;
use serde::Serialize;

use crate::error::{AdvisorError, AdvisorResult};
use crate::records::{PatientRecord, CONDITION_PREFIX};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

impl ColumnKind {
    pub fn of(dtype: &DataType) -> Self {
        if dtype.is_numeric() {
            ColumnKind::Numeric
        } else {
            ColumnKind::Categorical
        }
    }
}

#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
    pub dtype: DataType,
}

#[derive(Debug, Clone)]
pub struct Dataset {
    frame: Arc<DataFrame>,
    columns: Arc<[ColumnSpec]>,
}

impl Dataset {
    pub fn new(frame: DataFrame) -> Self {
        let columns: Vec<ColumnSpec> = frame
            .get_columns()
            .iter()
            .map(|series| ColumnSpec {
                name: series.name().to_string(),
                kind: ColumnKind::of(series.dtype()),
                dtype: series.dtype().clone(),
            })
            .collect();
        debug!(
            "dataset schema: {:?}",
            columns.iter().map(|c| (&c.name, c.kind)).collect::<Vec<_>>()
        );
        Dataset {
            frame: Arc::new(frame),
            columns: columns.into(),
        }
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    /// Columns in schema order.
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    /// Distinct non-null values of a column in order of first appearance,
    /// rendered as text.
    pub fn distinct_values(&self, name: &str) -> AdvisorResult<Vec<String>> {
        if !self.has_column(name) {
            return Err(AdvisorError::missing_column(name));
        }
        let distinct = self
            .frame
            .as_ref()
            .clone()
            .lazy()
            .select([col(name).drop_nulls().unique_stable().cast(DataType::Utf8)])
            .collect()?;
        let values = distinct
            .column(name)?
            .utf8()?
            .into_no_null_iter()
            .map(str::to_string)
            .collect();
        Ok(values)
    }

    /// Binary clinical-history columns, in schema order.
    pub fn condition_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.name.starts_with(CONDITION_PREFIX) && is_flag_dtype(&c.dtype))
            .map(|c| c.name.as_str())
            .collect()
    }

    pub fn write_parquet<P: AsRef<Path>>(&self, path: P) -> AdvisorResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = File::create(path)?;
        let mut df = (*self.frame).clone();
        ParquetWriter::new(&mut file).finish(&mut df)?;
        info!("wrote {} rows to {:?}", df.height(), path);
        Ok(())
    }
}

/// Whether a column can act as a 0/1 condition flag.
pub(crate) fn is_flag_dtype(dtype: &DataType) -> bool {
    dtype.is_numeric() || matches!(dtype, DataType::Boolean)
}

pub fn read_parquet<P: AsRef<Path>>(path: P) -> AdvisorResult<DataFrame> {
    let file = File::open(path)?;

    Ok(ParquetReader::new(file).finish()?)
}

pub fn read_csv<P: AsRef<Path>>(path: P) -> AdvisorResult<DataFrame> {
    let file = File::open(path)?;

    Ok(CsvReader::new(file)
        .has_header(true)
        .with_dtypes(Some(Arc::new(PatientRecord::raw_schema())))
        .finish()?)
}

/// Read the first worksheet of a spreadsheet, using the first row as header.
///
/// Columns holding only numbers become `Int64` (all integral) or `Float64`,
/// columns holding only booleans become `Boolean`, anything else `Utf8`.
/// The filter columns are always read as text.
pub fn read_xlsx<P: AsRef<Path>>(path: P) -> AdvisorResult<DataFrame> {
    let path = path.as_ref();
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AdvisorError::InputFormat {
            path: path.to_path_buf(),
        })??;

    let mut rows = range.rows();
    let header = rows.next().ok_or_else(|| AdvisorError::InputFormat {
        path: path.to_path_buf(),
    })?;
    let body: Vec<&[Cell]> = rows.collect();
    let pinned = PatientRecord::raw_schema();

    let columns: Vec<Series> = header
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let name = name.to_string();
            let cells: Vec<&Cell> = body
                .iter()
                .map(|row| row.get(i).unwrap_or(&Cell::Empty))
                .collect();
            sheet_column(&name, &cells, pinned.get(&name).is_some())
        })
        .collect();
    Ok(DataFrame::new(columns)?)
}

fn sheet_column(name: &str, cells: &[&Cell], as_text: bool) -> Series {
    let filled: Vec<&&Cell> = cells.iter().filter(|c| !c.is_empty()).collect();
    let numeric = |cell: &Cell| match cell {
        Cell::Int(v) => Some(*v as f64),
        Cell::Float(v) => Some(*v),
        _ => None,
    };

    if !as_text && !filled.is_empty() {
        if filled.iter().all(|c| numeric(c).is_some()) {
            let values: Vec<Option<f64>> = cells.iter().map(|c| numeric(c)).collect();
            if values.iter().flatten().all(|v| v.fract() == 0.0) {
                let ints: Vec<Option<i64>> =
                    values.iter().map(|v| v.map(|v| v as i64)).collect();
                return Series::new(name, ints);
            }
            return Series::new(name, values);
        }
        if filled.iter().all(|c| matches!(c, Cell::Bool(_))) {
            let flags: Vec<Option<bool>> = cells
                .iter()
                .map(|c| match c {
                    Cell::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect();
            return Series::new(name, flags);
        }
    }
    let text: Vec<Option<String>> = cells
        .iter()
        .map(|c| (!c.is_empty()).then(|| c.to_string()))
        .collect();
    Series::new(name, text)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Parquet,
    Xlsx,
}

impl FileFormat {
    pub fn infer(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(FileFormat::Csv),
            "parquet" | "pq" => Some(FileFormat::Parquet),
            "xlsx" | "xlsm" | "xls" => Some(FileFormat::Xlsx),
            _ => None,
        }
    }
}

/// Load a dataset, choosing the reader from the file extension.
pub fn load<P: AsRef<Path>>(path: P) -> AdvisorResult<Dataset> {
    let path = path.as_ref();
    let frame = match FileFormat::infer(path) {
        Some(FileFormat::Csv) => read_csv(path)?,
        Some(FileFormat::Parquet) => read_parquet(path)?,
        Some(FileFormat::Xlsx) => read_xlsx(path)?,
        None => {
            return Err(AdvisorError::InputFormat {
                path: path.to_path_buf(),
            })
        }
    };
    info!("loaded {} rows x {} columns from {:?}", frame.height(), frame.width(), path);
    Ok(Dataset::new(frame))
}

/// Load from `cache` when present, otherwise load `source` and write the cache.
pub fn load_cached<P: AsRef<Path>, Q: AsRef<Path>>(source: P, cache: Q) -> AdvisorResult<Dataset> {
    let cache = cache.as_ref();
    if cache.exists() {
        debug!("using cached dataset {:?}", cache);
        return load(cache);
    }
    let dataset = load(source)?;
    dataset.write_parquet(cache)?;
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;
    use std::io::Write;
    use tempfile::TempDir;

    const SAMPLE_CSV: &str = "\
AgeCategory,SmokerStatus,HadDiabetes,HadStroke,BMI
45-54,Current Smoker,1,0,31.5
45-54,Current Smoker,0,0,27.0
18-34,Never Smoked,0,1,22.1
";

    fn write_sample(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("patients.csv");
        let mut file = File::create(&path).expect("create csv");
        file.write_all(SAMPLE_CSV.as_bytes()).expect("write csv");
        path
    }

    #[test]
    fn tags_column_kinds_once() {
        let df = df!(
            "AgeCategory" => &["45-54"],
            "HadDiabetes" => &[1i32],
            "BMI" => &[30.2f64],
            "Sex" => &["Female"]
        )
        .unwrap();
        let dataset = Dataset::new(df);
        let kinds: Vec<_> = dataset.columns().iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ColumnKind::Categorical,
                ColumnKind::Numeric,
                ColumnKind::Numeric,
                ColumnKind::Categorical
            ]
        );
        assert_eq!(dataset.condition_columns(), vec!["HadDiabetes"]);
    }

    #[test]
    fn loads_csv_with_filter_columns_as_strings() {
        let dir = TempDir::new().unwrap();
        let dataset = load(write_sample(&dir)).unwrap();
        assert_eq!(dataset.height(), 3);
        assert_eq!(dataset.column("AgeCategory").unwrap().dtype, DataType::Utf8);
        assert_eq!(dataset.column("BMI").unwrap().kind, ColumnKind::Numeric);
        assert_eq!(
            dataset.distinct_values("AgeCategory").unwrap(),
            vec!["45-54".to_string(), "18-34".to_string()]
        );
    }

    #[test]
    fn loads_first_sheet_of_xlsx() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("patients.xlsx");
        let mut workbook = Workbook::new();
        {
            let sheet = workbook.add_worksheet();
            let header = ["AgeCategory", "SmokerStatus", "HadDiabetes", "BMI"];
            for (col, name) in header.iter().enumerate() {
                sheet.write_string(0, col as u16, *name).unwrap();
            }
            let rows = [
                ("45-54", "Current Smoker", 1.0, 31.5),
                ("18-34", "Never Smoked", 0.0, 22.1),
            ];
            for (i, (age, smoker, diabetes, bmi)) in rows.iter().enumerate() {
                let row = i as u32 + 1;
                sheet.write_string(row, 0, *age).unwrap();
                sheet.write_string(row, 1, *smoker).unwrap();
                sheet.write_number(row, 2, *diabetes).unwrap();
                sheet.write_number(row, 3, *bmi).unwrap();
            }
        }
        workbook.save(&path).unwrap();

        let dataset = load(&path).unwrap();
        assert_eq!(dataset.height(), 2);
        assert_eq!(dataset.column("AgeCategory").unwrap().dtype, DataType::Utf8);
        assert_eq!(dataset.column("SmokerStatus").unwrap().dtype, DataType::Utf8);
        assert_eq!(dataset.column("HadDiabetes").unwrap().dtype, DataType::Int64);
        assert_eq!(dataset.column("BMI").unwrap().dtype, DataType::Float64);
        assert_eq!(dataset.condition_columns(), vec!["HadDiabetes"]);
        assert_eq!(
            dataset.distinct_values("SmokerStatus").unwrap(),
            vec!["Current Smoker".to_string(), "Never Smoked".to_string()]
        );
    }

    #[test]
    fn numeric_looking_filter_column_stays_text_in_xlsx() {
        let cells = [Cell::Int(45), Cell::Empty];
        let refs: Vec<&Cell> = cells.iter().collect();
        let series = sheet_column("AgeCategory", &refs, true);
        assert_eq!(series.dtype(), &DataType::Utf8);
        assert_eq!(series.null_count(), 1);
        assert_eq!(sheet_column("Age", &refs, false).dtype(), &DataType::Int64);
    }

    #[test]
    fn rejects_unknown_extension() {
        let err = load("patients.xlsx").unwrap_err();
        assert!(matches!(err, AdvisorError::InputFormat { .. }));
    }

    #[test]
    fn distinct_values_of_missing_column_is_schema_mismatch() {
        let dataset = Dataset::new(df!("AgeCategory" => &["45-54"]).unwrap());
        let err = dataset.distinct_values("SmokerStatus").unwrap_err();
        assert!(err.is_invalid_request());
    }

    #[test]
    fn cache_is_written_then_reused() {
        let dir = TempDir::new().unwrap();
        let source = write_sample(&dir);
        let cache = dir.path().join("cache").join("patients.parquet");

        let first = load_cached(&source, &cache).unwrap();
        assert!(cache.exists());

        fs::remove_file(&source).unwrap();
        let second = load_cached(&source, &cache).unwrap();
        assert_eq!(first.height(), second.height());
        assert!(first.frame().frame_equal(second.frame()));
    }
}
