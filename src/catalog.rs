//! Reference tables kept by the lab: species list, sequencer register and the
//! positive/negative control lists. All are CSV exports of the lab's sheets.

use anyhow::{Context, Result, anyhow};
use csv::{ReaderBuilder, StringRecord};
use labplan_engine::libraries::ControlCatalogs;
use labplan_protocol::{ControlEntry, InstrumentDescriptor, SpeciesInfo};
use std::{collections::BTreeMap, fs, path::Path};

pub const COL_SPECIES_NAME: &str = "名称";
pub const COL_TAXID: &str = "taxid";
pub const COL_CLASSIFICATION: &str = "分类";
pub const COL_LATIN: &str = "拉丁文";
pub const COL_CONTROL_SPECIES: &str = "物种名称";
pub const COL_RPM: &str = "rpm";
pub const COL_DEVICE_SERIAL: &str = "设备序列号";
pub const COL_DEVICE_MODEL: &str = "设备型号";

/// The species header row sits somewhere in the first rows, under a title.
const SPECIES_HEADER_SCAN_ROWS: usize = 20;

fn read_rows(path: &Path, what: &str) -> Result<Option<Vec<StringRecord>>> {
    if !path.exists() {
        log::warn!("{what} '{}' not found, continuing without it", path.display());
        return Ok(None);
    }
    let text = fs::read_to_string(path)
        .with_context(|| format!("Could not read {what} '{}'", path.display()))?;
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());
    let rows = rdr
        .records()
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Could not parse {what} '{}'", path.display()))?;
    Ok(Some(rows))
}

fn to_vec(record: &StringRecord) -> Vec<String> {
    record.iter().map(|s| s.trim().to_string()).collect()
}

fn column(headers: &[String], name: &str) -> Option<usize> {
    headers.iter().position(|h| h == name)
}

fn cell(record: &StringRecord, idx: Option<usize>) -> String {
    idx.and_then(|i| record.get(i))
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpeciesCatalog {
    pub entries: BTreeMap<String, SpeciesInfo>,
}

impl SpeciesCatalog {
    pub fn load(path: &Path) -> Result<Self> {
        let Some(rows) = read_rows(path, "species list")? else {
            return Ok(Self::default());
        };
        let header_idx = rows
            .iter()
            .take(SPECIES_HEADER_SCAN_ROWS)
            .position(|r| {
                let h = to_vec(r);
                h.iter().any(|c| c == COL_SPECIES_NAME) && h.iter().any(|c| c == COL_TAXID)
            })
            .ok_or_else(|| {
                anyhow!(
                    "No header with '{COL_SPECIES_NAME}' and '{COL_TAXID}' in the first {SPECIES_HEADER_SCAN_ROWS} rows of '{}'",
                    path.display()
                )
            })?;
        let headers = to_vec(&rows[header_idx]);
        let name_col = column(&headers, COL_SPECIES_NAME);
        let class_col = column(&headers, COL_CLASSIFICATION);
        let taxid_col = column(&headers, COL_TAXID);
        let latin_col = column(&headers, COL_LATIN);

        let mut entries = BTreeMap::new();
        for row in &rows[header_idx + 1..] {
            let name = cell(row, name_col);
            if name.is_empty() {
                continue;
            }
            entries.insert(
                name,
                SpeciesInfo {
                    classification: cell(row, class_col),
                    taxid: cell(row, taxid_col),
                    latin_name: cell(row, latin_col),
                },
            );
        }
        log::info!("Loaded {} species from '{}'", entries.len(), path.display());
        Ok(Self { entries })
    }
}

/// Serial number to instrument model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequencerCatalog {
    pub models: BTreeMap<String, String>,
}

impl SequencerCatalog {
    pub fn load(path: &Path) -> Result<Self> {
        let Some(rows) = read_rows(path, "sequencer list")? else {
            return Ok(Self::default());
        };
        let Some((header, body)) = rows.split_first() else {
            return Ok(Self::default());
        };
        let headers = to_vec(header);
        let (Some(sn_col), Some(model_col)) = (
            column(&headers, COL_DEVICE_SERIAL),
            column(&headers, COL_DEVICE_MODEL),
        ) else {
            return Err(anyhow!(
                "Sequencer list '{}' needs '{COL_DEVICE_SERIAL}' and '{COL_DEVICE_MODEL}' columns",
                path.display()
            ));
        };
        let models = body
            .iter()
            .map(|r| (cell(r, Some(sn_col)), cell(r, Some(model_col))))
            .filter(|(sn, _)| !sn.is_empty())
            .collect();
        Ok(Self { models })
    }

    pub fn model(&self, serial: &str) -> Option<&str> {
        self.models
            .get(serial.trim())
            .map(String::as_str)
            .filter(|m| !m.is_empty())
    }

    /// Fills in models for instruments that do not have one yet.
    pub fn resolve(&self, instruments: &mut [InstrumentDescriptor]) {
        for instrument in instruments.iter_mut() {
            if instrument.model.is_none() {
                instrument.model = self.model(&instrument.serial).map(str::to_string);
            }
        }
    }
}

/// PC or NC list. Rows that are entirely blank are skipped.
pub fn load_control_list(path: &Path) -> Result<Vec<ControlEntry>> {
    let Some(rows) = read_rows(path, "control list")? else {
        return Ok(vec![]);
    };
    let Some((header, body)) = rows.split_first() else {
        return Ok(vec![]);
    };
    let headers = to_vec(header);
    let species = column(&headers, COL_CONTROL_SPECIES);
    let classification = column(&headers, COL_CLASSIFICATION);
    let taxid = column(&headers, COL_TAXID);
    let rpm = column(&headers, COL_RPM);
    if species.is_none() {
        return Err(anyhow!(
            "Control list '{}' has no '{COL_CONTROL_SPECIES}' column",
            path.display()
        ));
    }
    Ok(body
        .iter()
        .filter(|r| r.iter().any(|c| !c.trim().is_empty()))
        .map(|r| ControlEntry {
            species: cell(r, species),
            classification: cell(r, classification),
            taxid: cell(r, taxid),
            rpm: cell(r, rpm),
        })
        .collect())
}

pub fn load_controls(positive: Option<&Path>, negative: Option<&Path>) -> Result<ControlCatalogs> {
    Ok(ControlCatalogs {
        positive: positive.map(load_control_list).transpose()?.unwrap_or_default(),
        negative: negative.map(load_control_list).transpose()?.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &tempfile::TempDir, name: &str, text: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_species_header_found_below_title() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "species.csv",
            "物种列表,,,\n,,,\n名称,分类,taxid,拉丁文\n白色念珠菌,真菌,5476,Candida albicans\n,,,\n肺炎支原体,细菌,2104,Mycoplasma pneumoniae\n",
        );
        let catalog = SpeciesCatalog::load(&path).unwrap();
        assert_eq!(catalog.entries.len(), 2);
        let info = &catalog.entries["白色念珠菌"];
        assert_eq!(info.classification, "真菌");
        assert_eq!(info.taxid, "5476");
        assert_eq!(info.latin_name, "Candida albicans");
    }

    #[test]
    fn test_species_without_header_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "species.csv", "name,tax\nfoo,1\n");
        assert!(SpeciesCatalog::load(&path).is_err());
    }

    #[test]
    fn test_missing_catalogs_are_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.csv");
        assert!(SpeciesCatalog::load(&missing).unwrap().entries.is_empty());
        assert!(SequencerCatalog::load(&missing).unwrap().models.is_empty());
        assert!(load_control_list(&missing).unwrap().is_empty());
    }

    #[test]
    fn test_sequencer_models_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "sequencers.csv",
            "序号,设备名称,内部编号,设备型号,设备序列号\n1,测序仪A,S-01,NextSeq 550,TPNB500477\n2,测序仪B,S-02,,NB552999\n",
        );
        let catalog = SequencerCatalog::load(&path).unwrap();
        let mut instruments = vec![
            InstrumentDescriptor::new("TPNB500477", 143),
            InstrumentDescriptor::new("NB552999", 1),
            InstrumentDescriptor::new("UNKNOWN1", 1),
        ];
        catalog.resolve(&mut instruments);
        assert_eq!(instruments[0].model.as_deref(), Some("NextSeq 550"));
        assert_eq!(instruments[1].model, None);
        assert_eq!(instruments[2].model, None);

        let bad = write(&dir, "bad.csv", "serial,model\nX,Y\n");
        assert!(SequencerCatalog::load(&bad).is_err());
    }

    #[test]
    fn test_control_lists() {
        let dir = tempfile::tempdir().unwrap();
        let pc = write(
            &dir,
            "pc.csv",
            "物种名称,分类,taxid,rpm\n铜绿假单胞菌,细菌,287,50~100\n,,,\n白色念珠菌,,,20\n",
        );
        let nc = write(&dir, "nc.csv", "物种名称,分类\n人类,\n");
        let controls = load_controls(Some(pc.as_path()), Some(nc.as_path())).unwrap();
        assert_eq!(controls.positive.len(), 2);
        assert_eq!(controls.positive[0].rpm, "50~100");
        assert_eq!(controls.positive[1].taxid, "");
        assert_eq!(controls.negative_species(), "人类");

        let none = load_controls(None, None).unwrap();
        assert_eq!(none.negative_species(), "/");
    }
}
