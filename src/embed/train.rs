//! Full batch training of a [GaeModel] with early stopping on the validation loss.

use cpu_time::ProcessTime;
use std::time::SystemTime;

use ndarray::Array2;

use super::gae::{GaeLoss, GaeModel, LossWeights, PreparedSample, TrainableT};
use super::history::{LossHistory, LossRecord, Mode};
use super::optim::{Adam, AdamParams};

/// optimization parameters of train_gae
#[derive(Copy, Clone, Debug)]
pub struct GaeFitParams {
    pub adam: AdamParams,
    pub n_epochs: usize,
    /// patience : training stops when validation loss did not improve during early_stopping epochs
    pub early_stopping: usize,
    pub weights: LossWeights,
}

impl Default for GaeFitParams {
    fn default() -> Self {
        GaeFitParams {
            adam: AdamParams::new(1.0e-3, 0.),
            n_epochs: 100,
            early_stopping: 50,
            weights: LossWeights::default(),
        }
    }
}

fn record(epoch: i64, mode: Mode, loss: &GaeLoss) -> LossRecord {
    LossRecord {
        epoch,
        mode,
        total_loss: loss.total,
        gae_recon_loss: loss.gae_recon,
        feat_recon_loss: loss.feat_recon,
        class_loss: loss.class,
    }
}

/// trains model on train sample, monitoring val sample.
/// At exit the model holds the parameters of the epoch with the best validation loss.
pub fn train_gae(
    model: &mut GaeModel,
    train: &PreparedSample,
    val: &PreparedSample,
    params: &GaeFitParams,
) -> anyhow::Result<LossHistory> {
    //
    model.check(train)?;
    model.check(val)?;
    let cpu_start = ProcessTime::now();
    let sys_start = SystemTime::now();
    //
    let mut history = LossHistory::new();
    let mut optimizer = Adam::new(params.adam, &model.shapes());
    let weights = &params.weights;
    // evaluation before training
    let (train_loss, _) = model.loss_and_grad(train, weights, false);
    let (val_loss, _) = model.loss_and_grad(val, weights, false);
    history.push(record(-1, Mode::Train, &train_loss));
    history.push(record(-1, Mode::Val, &val_loss));
    let mut best_loss = val_loss.total;
    let mut best_params: Vec<Array2<f64>> = model.parameters().into_iter().cloned().collect();
    let mut best_epoch: i64 = -1;
    let mut nb_no_improve = 0;
    //
    for epoch in 0..params.n_epochs {
        let (_, grads) = model.loss_and_grad(train, weights, true);
        if let Some(grads) = grads {
            optimizer.step(model.parameters_mut(), &grads);
        }
        let (train_loss, _) = model.loss_and_grad(train, weights, false);
        let (val_loss, _) = model.loss_and_grad(val, weights, false);
        history.push(record(epoch as i64, Mode::Train, &train_loss));
        history.push(record(epoch as i64, Mode::Val, &val_loss));
        log::debug!(
            "epoch {} train loss : {:.4e}, val loss : {:.4e}",
            epoch,
            train_loss.total,
            val_loss.total
        );
        if !val_loss.total.is_finite() {
            log::error!("train_gae : non finite validation loss at epoch {}", epoch);
            break;
        }
        if val_loss.total < best_loss {
            best_loss = val_loss.total;
            best_epoch = epoch as i64;
            best_params = model.parameters().into_iter().cloned().collect();
            nb_no_improve = 0;
        } else {
            nb_no_improve += 1;
            if nb_no_improve >= params.early_stopping {
                log::info!(
                    "train_gae : early stopping at epoch {}, no improvement since epoch {}",
                    epoch,
                    best_epoch
                );
                break;
            }
        }
    }
    // restore best parameters
    for (w, best) in model.parameters_mut().into_iter().zip(best_params.into_iter()) {
        *w = best;
    }
    log::info!(
        "train_gae best val loss : {:.4e} at epoch {}, sys time(ms) {:?} cpu time(ms) {:?}",
        best_loss,
        best_epoch,
        sys_start.elapsed().map(|d| d.as_millis()).unwrap_or(0),
        cpu_start.elapsed().as_millis()
    );
    //
    Ok(history)
} // end of train_gae

//========================================================================================

// end of mod tests
