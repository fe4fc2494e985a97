//! Descriptive statistics over a filtered patient subset.
//!
//! Mirrors the "describe all columns" layout: categorical columns report
//! `count unique top freq`, numeric columns report
//! `count mean std min 25% 50% 75% max`. Cells that do not apply or cannot be
//! computed (empty subsets, a single value for `std`) are absent and rendered
//! as `NaN`.

use std::collections::HashMap;
use std::fmt;

use polars::prelude::*;
use serde::Serialize;

use crate::dataset::{ColumnKind, ColumnSpec};
use crate::error::AdvisorResult;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoricalStats {
    pub unique: usize,
    pub top: Option<String>,
    pub freq: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericStats {
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub p25: Option<f64>,
    pub p50: Option<f64>,
    pub p75: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ColumnStats {
    Categorical(CategoricalStats),
    Numeric(NumericStats),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub name: String,
    pub count: usize,
    pub stats: ColumnStats,
}

impl ColumnSummary {
    pub fn kind(&self) -> ColumnKind {
        match self.stats {
            ColumnStats::Categorical(_) => ColumnKind::Categorical,
            ColumnStats::Numeric(_) => ColumnKind::Numeric,
        }
    }

    /// Rendered cell for a statistic row, `None` when the row does not apply.
    fn cell(&self, row: Row) -> Option<String> {
        match (&self.stats, row) {
            (_, Row::Count) => Some(self.count.to_string()),
            (ColumnStats::Categorical(c), Row::Unique) => Some(c.unique.to_string()),
            (ColumnStats::Categorical(c), Row::Top) => c.top.as_deref().map(sanitize),
            (ColumnStats::Categorical(c), Row::Freq) => c.freq.map(|f| f.to_string()),
            (ColumnStats::Numeric(n), Row::Mean) => n.mean.map(format_number),
            (ColumnStats::Numeric(n), Row::Std) => n.std.map(format_number),
            (ColumnStats::Numeric(n), Row::Min) => n.min.map(format_number),
            (ColumnStats::Numeric(n), Row::P25) => n.p25.map(format_number),
            (ColumnStats::Numeric(n), Row::P50) => n.p50.map(format_number),
            (ColumnStats::Numeric(n), Row::P75) => n.p75.map(format_number),
            (ColumnStats::Numeric(n), Row::Max) => n.max.map(format_number),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Row {
    Count,
    Unique,
    Top,
    Freq,
    Mean,
    Std,
    Min,
    P25,
    P50,
    P75,
    Max,
}

impl Row {
    const CATEGORICAL: [Row; 3] = [Row::Unique, Row::Top, Row::Freq];
    const NUMERIC: [Row; 7] = [
        Row::Mean,
        Row::Std,
        Row::Min,
        Row::P25,
        Row::P50,
        Row::P75,
        Row::Max,
    ];

    fn label(self) -> &'static str {
        match self {
            Row::Count => "count",
            Row::Unique => "unique",
            Row::Top => "top",
            Row::Freq => "freq",
            Row::Mean => "mean",
            Row::Std => "std",
            Row::Min => "min",
            Row::P25 => "25%",
            Row::P50 => "50%",
            Row::P75 => "75%",
            Row::Max => "max",
        }
    }
}

/// Statistics for every column of a subset, in schema order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Description {
    pub rows: usize,
    pub columns: Vec<ColumnSummary>,
}

impl Description {
    fn row_layout(&self) -> Vec<Row> {
        let mut rows = vec![Row::Count];
        if self.columns.iter().any(|c| c.kind() == ColumnKind::Categorical) {
            rows.extend(Row::CATEGORICAL);
        }
        if self.columns.iter().any(|c| c.kind() == ColumnKind::Numeric) {
            rows.extend(Row::NUMERIC);
        }
        rows
    }

    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Description {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows = self.row_layout();
        let label_width = rows.iter().map(|r| r.label().len()).max().unwrap_or(0);

        // cells[column][row]
        let cells: Vec<Vec<String>> = self
            .columns
            .iter()
            .map(|c| {
                rows.iter()
                    .map(|r| c.cell(*r).unwrap_or_else(|| "NaN".to_string()))
                    .collect()
            })
            .collect();
        let headers: Vec<String> = self.columns.iter().map(|c| sanitize(&c.name)).collect();
        let widths: Vec<usize> = headers
            .iter()
            .zip(&cells)
            .map(|(h, col)| {
                col.iter()
                    .map(|c| c.chars().count())
                    .chain(std::iter::once(h.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        write!(f, "{:label_width$}", "")?;
        for (header, width) in headers.iter().zip(&widths) {
            write!(f, "  {:>width$}", header, width = *width)?;
        }
        for (i, row) in rows.iter().enumerate() {
            writeln!(f)?;
            write!(f, "{:<label_width$}", row.label())?;
            for (col, width) in cells.iter().zip(&widths) {
                write!(f, "  {:>width$}", col[i], width = *width)?;
            }
        }
        Ok(())
    }
}

/// Describe every column of `frame` listed in `columns`.
pub fn describe(frame: &DataFrame, columns: &[ColumnSpec]) -> AdvisorResult<Description> {
    let summaries = columns
        .iter()
        .map(|spec| {
            let series = frame.column(&spec.name)?;
            match spec.kind {
                ColumnKind::Numeric => describe_numeric(series),
                ColumnKind::Categorical => describe_categorical(series),
            }
        })
        .collect::<AdvisorResult<Vec<_>>>()?;
    Ok(Description {
        rows: frame.height(),
        columns: summaries,
    })
}

fn describe_categorical(series: &Series) -> AdvisorResult<ColumnSummary> {
    let text = series.cast(&DataType::Utf8)?.drop_nulls();
    let unique = text.n_unique()?;

    // Highest frequency wins; ties go to the value seen first.
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (position, value) in text.utf8()?.into_no_null_iter().enumerate() {
        counts.entry(value).or_insert((0, position)).0 += 1;
    }
    let top = counts
        .iter()
        .min_by(|(_, (fa, pa)), (_, (fb, pb))| fb.cmp(fa).then(pa.cmp(pb)))
        .map(|(value, (freq, _))| (value.to_string(), *freq));

    Ok(ColumnSummary {
        name: series.name().to_string(),
        count: text.len(),
        stats: ColumnStats::Categorical(CategoricalStats {
            unique,
            top: top.as_ref().map(|(v, _)| v.clone()),
            freq: top.map(|(_, f)| f),
        }),
    })
}

fn describe_numeric(series: &Series) -> AdvisorResult<ColumnSummary> {
    let floats = series.cast(&DataType::Float64)?.drop_nulls();

    Ok(ColumnSummary {
        name: series.name().to_string(),
        count: floats.len(),
        stats: ColumnStats::Numeric(numeric_stats(floats.f64()?)?),
    })
}

/// Aggregates over a null-free column; every figure is absent when it is empty.
fn numeric_stats(values: &Float64Chunked) -> AdvisorResult<NumericStats> {
    let quantile = |q: f64| values.quantile(q, QuantileInterpolOptions::Linear);
    Ok(NumericStats {
        mean: values.mean(),
        // sample deviation, undefined below two values
        std: if values.len() > 1 { values.std(1) } else { None },
        min: values.min(),
        p25: quantile(0.25)?,
        p50: quantile(0.50)?,
        p75: quantile(0.75)?,
        max: values.max(),
    })
}

fn format_number(value: f64) -> String {
    if !value.is_finite() {
        return "NaN".to_string();
    }
    let text = format!("{:.6}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" {
        "0".to_string()
    } else {
        text.to_string()
    }
}

fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;

    fn sample() -> Dataset {
        Dataset::new(
            df!(
                "SmokerStatus" => &["Current Smoker", "Never Smoked", "Current Smoker", "Former Smoker"],
                "BMI" => &[Some(20.0f64), Some(30.0), None, Some(40.0)]
            )
            .unwrap(),
        )
    }

    fn stats(dataset: &Dataset) -> Description {
        describe(dataset.frame(), dataset.columns()).unwrap()
    }

    #[test]
    fn categorical_counts_and_top() {
        let description = stats(&sample());
        let smoker = &description.columns[0];
        assert_eq!(smoker.count, 4);
        assert_eq!(
            smoker.stats,
            ColumnStats::Categorical(CategoricalStats {
                unique: 3,
                top: Some("Current Smoker".to_string()),
                freq: Some(2),
            })
        );
    }

    #[test]
    fn numeric_skips_nulls() {
        let description = stats(&sample());
        let bmi = &description.columns[1];
        assert_eq!(bmi.count, 3);
        let ColumnStats::Numeric(n) = &bmi.stats else {
            panic!("BMI should be numeric");
        };
        assert_eq!(n.mean, Some(30.0));
        assert_eq!(n.std, Some(10.0));
        assert_eq!(n.min, Some(20.0));
        assert_eq!(n.p25, Some(25.0));
        assert_eq!(n.p50, Some(30.0));
        assert_eq!(n.p75, Some(35.0));
        assert_eq!(n.max, Some(40.0));
    }

    #[test]
    fn single_value_has_no_std() {
        let values = Float64Chunked::from_slice("BMI", &[7.0]);
        let n = numeric_stats(&values).unwrap();
        assert_eq!(n.mean, Some(7.0));
        assert_eq!(n.std, None);
        assert_eq!(n.p75, Some(7.0));
    }

    #[test]
    fn quartiles_interpolate_linearly() {
        let values = Float64Chunked::from_slice("Age", &[1.0, 2.0, 3.0, 4.0]);
        let n = numeric_stats(&values).unwrap();
        assert_eq!(n.p25, Some(1.75));
        assert_eq!(n.p50, Some(2.5));
        assert_eq!(n.p75, Some(3.25));
        assert_eq!(n.min, Some(1.0));
        assert_eq!(n.max, Some(4.0));
    }

    #[test]
    fn unique_ignores_nulls() {
        let dataset = Dataset::new(
            df!("SmokerStatus" => &[Some("Never Smoked"), None, Some("Never Smoked"), None]).unwrap(),
        );
        let description = stats(&dataset);
        let column = &description.columns[0];
        assert_eq!(column.count, 2);
        let ColumnStats::Categorical(c) = &column.stats else {
            panic!("SmokerStatus should be categorical");
        };
        assert_eq!(c.unique, 1);
        assert_eq!(c.freq, Some(2));
    }

    #[test]
    fn tie_goes_to_first_seen_value() {
        let dataset = Dataset::new(df!("Sex" => &["Male", "Female", "Female", "Male"]).unwrap());
        let description = stats(&dataset);
        let ColumnStats::Categorical(c) = &description.columns[0].stats else {
            panic!("Sex should be categorical");
        };
        assert_eq!(c.top.as_deref(), Some("Male"));
        assert_eq!(c.freq, Some(2));
    }

    #[test]
    fn empty_frame_reports_zero_counts() {
        let dataset = sample();
        let empty = dataset.frame().head(Some(0));
        let description = describe(&empty, dataset.columns()).unwrap();
        assert_eq!(description.rows, 0);
        assert!(description.columns.iter().all(|c| c.count == 0));

        let text = description.render();
        let count_line = text.lines().nth(1).unwrap();
        assert!(count_line.starts_with("count"));
        assert_eq!(count_line.split_whitespace().skip(1).collect::<Vec<_>>(), vec!["0", "0"]);
        let mean_line = text.lines().find(|l| l.starts_with("mean")).unwrap();
        assert_eq!(mean_line.split_whitespace().collect::<Vec<_>>(), vec!["mean", "NaN", "NaN"]);
    }

    #[test]
    fn renders_rows_in_canonical_order() {
        let text = stats(&sample()).render();
        let labels: Vec<&str> = text
            .lines()
            .skip(1)
            .map(|l| l.split_whitespace().next().unwrap())
            .collect();
        assert_eq!(
            labels,
            vec!["count", "unique", "top", "freq", "mean", "std", "min", "25%", "50%", "75%", "max"]
        );
        let header: Vec<&str> = text.lines().next().unwrap().split_whitespace().collect();
        assert_eq!(header, vec!["SmokerStatus", "BMI"]);
    }

    #[test]
    fn numeric_only_layout_omits_categorical_rows() {
        let dataset = Dataset::new(df!("BMI" => &[1.0f64, 2.0]).unwrap());
        let text = stats(&dataset).render();
        assert!(!text.contains("unique"));
        assert!(text.contains("std"));
    }

    #[test]
    fn formats_numbers_compactly() {
        assert_eq!(format_number(2.0), "2");
        assert_eq!(format_number(45.5), "45.5");
        assert_eq!(format_number(1.0 / 3.0), "0.333333");
        assert_eq!(format_number(-0.0000001), "0");
    }

    #[test]
    fn control_characters_are_replaced() {
        assert_eq!(sanitize("a\nb\tc"), "a b c");
    }
}
