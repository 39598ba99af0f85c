//! CSV output of unit and library tables, and reading an operator-edited unit
//! table back in.

use anyhow::{Context, Result, anyhow};
use csv::{ReaderBuilder, WriterBuilder};
use labplan_engine::codec;
use labplan_protocol::{
    FieldMap, LibraryRecord, UnitDescriptor,
    fields::{LIBRARY_COLUMNS, UNIT_COLUMNS, UNIT_DATE, UNIT_INSTRUMENT_SN, UNIT_RUN, cell_text},
};
use serde_json::Value;
use std::{io::Write, path::Path};

fn clean_header(h: &str) -> String {
    h.trim_start_matches('\u{feff}').trim().to_string()
}

/// Column order taken from a template's first row, blanks dropped.
pub fn template_columns(path: &Path) -> Result<Vec<String>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Could not open template '{}'", path.display()))?;
    let first = rdr
        .records()
        .next()
        .transpose()
        .with_context(|| format!("Could not parse template '{}'", path.display()))?
        .ok_or_else(|| anyhow!("Template '{}' is empty", path.display()))?;
    let columns: Vec<String> = first
        .iter()
        .map(clean_header)
        .filter(|h| !h.is_empty())
        .collect();
    if columns.is_empty() {
        return Err(anyhow!("Template '{}' has no column names", path.display()));
    }
    Ok(columns)
}

/// Template order when one is configured and present, otherwise `default`.
pub fn resolve_columns(template: Option<&Path>, default: &[&str]) -> Result<Vec<String>> {
    match template {
        Some(path) if path.exists() => template_columns(path),
        Some(path) => {
            log::warn!(
                "Template '{}' not found, using default columns",
                path.display()
            );
            Ok(default.iter().map(|s| s.to_string()).collect())
        }
        None => Ok(default.iter().map(|s| s.to_string()).collect()),
    }
}

/// Columns missing from a row are written empty; keys not in `columns` are
/// dropped.
pub fn write_rows<W: Write>(writer: W, columns: &[String], rows: &[FieldMap]) -> Result<()> {
    let mut wtr = WriterBuilder::new().from_writer(writer);
    wtr.write_record(columns)?;
    for row in rows {
        wtr.write_record(
            columns
                .iter()
                .map(|c| row.get(c).map(cell_text).unwrap_or_default()),
        )?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_to_path(path: &Path, columns: &[String], rows: &[FieldMap]) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Could not create '{}'", path.display()))?;
    write_rows(file, columns, rows).with_context(|| format!("Could not write '{}'", path.display()))
}

pub fn write_units(path: &Path, units: &[UnitDescriptor], template: Option<&Path>) -> Result<()> {
    let columns = resolve_columns(template, &UNIT_COLUMNS)?;
    let rows: Vec<FieldMap> = units.iter().map(UnitDescriptor::to_field_map).collect();
    write_to_path(path, &columns, &rows)?;
    log::info!("Wrote {} chip row(s) to '{}'", rows.len(), path.display());
    Ok(())
}

pub fn write_libraries(
    path: &Path,
    libraries: &[LibraryRecord],
    template: Option<&Path>,
) -> Result<()> {
    let columns = resolve_columns(template, &LIBRARY_COLUMNS)?;
    let rows: Vec<FieldMap> = libraries.iter().map(LibraryRecord::to_field_map).collect();
    write_to_path(path, &columns, &rows)?;
    log::info!("Wrote {} library row(s) to '{}'", rows.len(), path.display());
    Ok(())
}

/// Reads an edited unit table. Blank rows are skipped; a blank chip serial is
/// re-derived when the row's date allows it, otherwise left for the library
/// pass to reject.
pub fn read_units(path: &Path) -> Result<Vec<UnitDescriptor>> {
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Could not open unit table '{}'", path.display()))?;
    let headers: Vec<String> = rdr
        .headers()
        .with_context(|| format!("Could not read header of '{}'", path.display()))?
        .iter()
        .map(clean_header)
        .collect();

    let mut units = vec![];
    for (line, record) in rdr.records().enumerate() {
        let record = record
            .with_context(|| format!("Bad row {} in '{}'", line + 2, path.display()))?;
        if record.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        let map: FieldMap = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.clone(), Value::String(v.to_string())))
            .collect();
        let mut unit = UnitDescriptor::from_field_map(&map)
            .with_context(|| format!("Bad row {} in '{}'", line + 2, path.display()))?;
        if unit.unit_serial.is_empty() {
            let run_raw = map.get(UNIT_RUN).map(cell_text).unwrap_or_default();
            match codec::unit_serial_from_raw(&unit.date_code, &unit.instrument_serial, &run_raw) {
                Ok(serial) => unit.unit_serial = serial,
                Err(e) => log::warn!(
                    "Row {}: cannot re-derive chip serial ({UNIT_DATE} / {UNIT_INSTRUMENT_SN}): {e}",
                    line + 2
                ),
            }
        }
        units.push(unit);
    }
    log::info!("Read {} chip row(s) from '{}'", units.len(), path.display());
    Ok(units)
}
