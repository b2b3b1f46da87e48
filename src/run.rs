//! File based decomposition driven by a [`RunConfig`]

use crate::config::RunConfig;
use crate::error::Result;
use crate::infomax::Infomax;
use crate::io::{check_writable, read_matrix, write_matrix, write_signs, write_vector, Layout};
use crate::ParamGuard;

/// Read the data, decompose it and write all requested artifacts
///
/// Output files are checked for writability before any numerical work starts.
pub fn run(config: &RunConfig) -> Result<Infomax<f64>> {
    let params = config.params.check_ref()?;

    let outputs = [
        Some(&config.weights_out),
        Some(&config.sphere_file),
        config.activations_file.as_ref(),
        config.bias_file.as_ref(),
        config.sign_file.as_ref(),
    ];
    for path in outputs.iter().flatten() {
        check_writable(path)?;
    }

    let datalength = config.datalength()?;
    let layout = config.layout;
    log::info!(
        "loading {} channels x {} frames ({} layout) from {}",
        config.channels,
        datalength,
        layout,
        config.data_file.display()
    );
    let data = read_matrix::<f64>(&config.data_file, config.channels, datalength, layout)?;

    let params = match &config.weights_in {
        Some(path) => {
            let ncomps = params.ncomponents().unwrap_or(config.channels);
            log::info!("loading starting weights from {}", path.display());
            let weights = read_matrix(path, ncomps, ncomps, layout)?;
            config.params.clone().initial_weights(weights).check()?
        }
        None => params.clone(),
    };

    let model = params.decompose(data)?;

    write_matrix(&config.weights_out, model.weights(), layout)?;
    write_matrix(&config.sphere_file, model.sphere(), layout)?;
    if let Some(path) = &config.activations_file {
        write_matrix(path, model.activations(), layout)?;
    }
    if let Some(path) = &config.bias_file {
        match model.bias() {
            Some(bias) => write_vector(path, bias)?,
            None => log::warn!("bias adjustment is off, not writing {}", path.display()),
        }
    }
    if let Some(path) = &config.sign_file {
        match model.signs() {
            Some(signs) => write_signs(path, signs)?,
            None => log::warn!("extended Infomax is off, not writing {}", path.display()),
        }
    }

    Ok(model)
}
