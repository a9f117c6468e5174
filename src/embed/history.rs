//! Loss history recorded during training.

use std::fmt;
use std::path::Path;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

/// train or validation evaluation
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Train,
    Val,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Train => write!(f, "train"),
            Mode::Val => write!(f, "val"),
        }
    }
}

/// One evaluation. Epoch -1 is the evaluation before any optimization step.
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct LossRecord {
    pub epoch: i64,
    pub mode: Mode,
    pub total_loss: f64,
    pub gae_recon_loss: f64,
    pub feat_recon_loss: f64,
    pub class_loss: f64,
}

#[derive(Clone, Debug, Default)]
pub struct LossHistory {
    records: Vec<LossRecord>,
}

impl LossHistory {
    pub fn new() -> Self {
        LossHistory { records: Vec::new() }
    }

    pub fn push(&mut self, record: LossRecord) {
        self.records.push(record);
    }

    pub fn get_records(&self) -> &[LossRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// records of a mode, skipping epoch -1
    pub fn get_mode(&self, mode: Mode) -> Vec<LossRecord> {
        self.records
            .iter()
            .filter(|r| r.mode == mode && r.epoch > -1)
            .copied()
            .collect()
    }

    /// best (smallest) total loss of a mode and its epoch
    pub fn get_best(&self, mode: Mode) -> Option<(i64, f64)> {
        self.records
            .iter()
            .filter(|r| r.mode == mode)
            .map(|r| (r.epoch, r.total_loss))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
    }

    /// a history where the only loss is the total (Node2Vec for example), one record by epoch starting at 1
    pub fn from_epoch_losses(losses: &[f64]) -> Self {
        let records = losses
            .iter()
            .enumerate()
            .map(|(i, l)| LossRecord {
                epoch: (i + 1) as i64,
                mode: Mode::Train,
                total_loss: *l,
                gae_recon_loss: 0.,
                feat_recon_loss: 0.,
                class_loss: 0.,
            })
            .collect();
        LossHistory { records }
    }

    /// dump history as csv with header
    pub fn dump_csv(&self, path: &Path) -> anyhow::Result<()> {
        let mut writer = match csv::Writer::from_path(path) {
            Ok(writer) => writer,
            Err(e) => {
                log::error!("LossHistory::dump_csv could not open {:?}", path);
                return Err(anyhow!("could not open {:?} : {}", path, e));
            }
        };
        for record in &self.records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }
} // end of impl LossHistory
