use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use serde_json::Value;
use umya_spreadsheet::{HorizontalAlignmentValues, Spreadsheet};

use crate::error::AppError;

pub const FILE_NAME: &str = "evolution_data.xlsx";
const SHEET_NAME: &str = "Evolution Runs";

const HEADERS: [&str; 13] = [
    "Timestamp",
    "Generation",
    "Best Fitness",
    "Avg Fitness",
    "Genome Fitness",
    "Ortho Score",
    "Population Size",
    "Mutation Rate",
    "Elite Size",
    "Max Generations",
    "Topic",
    "Best Mnemonic",
    "Target Terms",
];

const COLUMN_WIDTHS: [(&str, f64); 13] = [
    ("A", 20.0),
    ("B", 12.0),
    ("C", 12.0),
    ("D", 12.0),
    ("E", 15.0),
    ("F", 12.0),
    ("G", 15.0),
    ("H", 15.0),
    ("I", 12.0),
    ("J", 15.0),
    ("K", 20.0),
    ("L", 60.0),
    ("M", 40.0),
];

/// One logged evolutionary-algorithm run, one spreadsheet row.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub timestamp: String,
    pub generation: i64,
    pub best_fitness: f64,
    pub avg_fitness: f64,
    pub genome_fitness: f64,
    pub ortho_score: f64,
    pub population_size: i64,
    pub mutation_rate: f64,
    pub elite_size: i64,
    pub max_generations: i64,
    pub topic: String,
    pub best_mnemonic: String,
    pub target_terms: String,
}

impl RunRecord {
    /// Build a record from a save payload, stamping it with the current
    /// server time. Absent fields take their documented defaults; present
    /// fields are coerced to the column type or fail with a coercion error.
    pub fn from_json(data: &Value) -> Result<Self, AppError> {
        Ok(Self {
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            generation: int_field(data, "generation", 0)?,
            best_fitness: float_field(data, "bestFitness", 0.0)?,
            avg_fitness: float_field(data, "avgFitness", 0.0)?,
            genome_fitness: float_field(data, "genomeFitness", 0.0)?,
            ortho_score: float_field(data, "orthoScore", 0.0)?,
            population_size: int_field(data, "populationSize", 5)?,
            mutation_rate: float_field(data, "mutationRate", 0.15)?,
            elite_size: int_field(data, "eliteSize", 1)?,
            max_generations: int_field(data, "maxGenerations", 20)?,
            topic: text_field(data, "topic", "N/A"),
            best_mnemonic: text_field(data, "bestMnemonic", "N/A"),
            target_terms: text_field(data, "targetTerms", "N/A"),
        })
    }
}

fn coercion_error(field: &str, message: impl Into<String>) -> AppError {
    AppError::CoercionError {
        field: field.to_string(),
        message: message.into(),
    }
}

fn float_field(data: &Value, key: &str, default: f64) -> Result<f64, AppError> {
    match data.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| coercion_error(key, "not representable as a number")),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| coercion_error(key, e.to_string())),
        Some(other) => Err(coercion_error(
            key,
            format!("cannot convert {} to a number", json_type(other)),
        )),
    }
}

fn int_field(data: &Value, key: &str, default: i64) -> Result<i64, AppError> {
    match data.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => Ok(i),
            // Fractional values truncate toward zero, like the column type.
            None => n
                .as_f64()
                .map(|f| f as i64)
                .ok_or_else(|| coercion_error(key, "not representable as an integer")),
        },
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| coercion_error(key, e.to_string())),
        Some(other) => Err(coercion_error(
            key,
            format!("cannot convert {} to an integer", json_type(other)),
        )),
    }
}

fn text_field(data: &Value, key: &str, default: &str) -> String {
    match data.get(key) {
        None | Some(Value::Null) => default.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn store_error(e: impl std::fmt::Display) -> AppError {
    AppError::StoreError(e.to_string())
}

/// Owns the on-disk run log. The file is the sole persistent store: every
/// append opens the workbook, writes one row, and saves it back. The append
/// path is serialized within this process; nothing guards against writers in
/// other processes.
pub struct SpreadsheetStore {
    path: PathBuf,
    append_lock: Mutex<()>,
}

impl SpreadsheetStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: data_dir.into().join(FILE_NAME),
            append_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the backing file with the fixed header row if it does not
    /// exist yet. An existing file is left untouched.
    pub fn ensure_initialized(&self) -> Result<(), AppError> {
        if self.path.exists() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let book = build_template()?;
        umya_spreadsheet::writer::xlsx::write(&book, &self.path).map_err(store_error)?;

        tracing::info!("Created spreadsheet template at {}", self.path.display());
        Ok(())
    }

    /// Append one record and return its row number (1-based, the header
    /// counts as row 1).
    pub fn append_record(&self, record: &RunRecord) -> Result<u32, AppError> {
        let _guard = self.append_lock.lock().unwrap();

        self.ensure_initialized()?;

        let mut book = umya_spreadsheet::reader::xlsx::read(&self.path).map_err(store_error)?;
        let row = {
            let sheet = book
                .get_sheet_mut(&0)
                .ok_or_else(|| AppError::StoreError("workbook has no sheets".to_string()))?;

            let row = sheet.get_highest_row() + 1;

            sheet.get_cell_mut((1, row)).set_value(&record.timestamp);
            sheet
                .get_cell_mut((2, row))
                .set_value_number(record.generation as f64);
            sheet
                .get_cell_mut((3, row))
                .set_value_number(record.best_fitness);
            sheet
                .get_cell_mut((4, row))
                .set_value_number(record.avg_fitness);
            sheet
                .get_cell_mut((5, row))
                .set_value_number(record.genome_fitness);
            sheet
                .get_cell_mut((6, row))
                .set_value_number(record.ortho_score);
            sheet
                .get_cell_mut((7, row))
                .set_value_number(record.population_size as f64);
            sheet
                .get_cell_mut((8, row))
                .set_value_number(record.mutation_rate);
            sheet
                .get_cell_mut((9, row))
                .set_value_number(record.elite_size as f64);
            sheet
                .get_cell_mut((10, row))
                .set_value_number(record.max_generations as f64);
            sheet.get_cell_mut((11, row)).set_value(&record.topic);
            sheet
                .get_cell_mut((12, row))
                .set_value(&record.best_mnemonic);
            sheet
                .get_cell_mut((13, row))
                .set_value(&record.target_terms);

            row
        };

        umya_spreadsheet::writer::xlsx::write(&book, &self.path).map_err(store_error)?;

        Ok(row)
    }

    /// Raw file content for download.
    pub fn fetch_file_bytes(&self) -> Result<Vec<u8>, AppError> {
        if !self.path.exists() {
            return Err(AppError::NotFound(
                "Spreadsheet file not found. Save some data first.".to_string(),
            ));
        }

        Ok(std::fs::read(&self.path)?)
    }
}

fn build_template() -> Result<Spreadsheet, AppError> {
    let mut book = umya_spreadsheet::new_file();
    let sheet = book
        .get_sheet_mut(&0)
        .ok_or_else(|| AppError::StoreError("new workbook has no sheets".to_string()))?;
    sheet.set_name(SHEET_NAME);

    for (i, header) in HEADERS.iter().enumerate() {
        let col = i as u32 + 1;
        sheet.get_cell_mut((col, 1)).set_value(*header);

        let style = sheet.get_style_mut((col, 1));
        style.get_font_mut().set_bold(true);
        style.get_font_mut().get_color_mut().set_argb("FFFFFFFF");
        style.set_background_color("FF4472C4");
        style
            .get_alignment_mut()
            .set_horizontal(HorizontalAlignmentValues::Center);
    }

    for (col, width) in COLUMN_WIDTHS {
        sheet.get_column_dimension_mut(col).set_width(width);
    }

    Ok(book)
}
