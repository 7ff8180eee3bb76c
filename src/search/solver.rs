//! External isomorphism solver invocation

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{Error, Result};
use crate::lattice::SearchResultsFile;
use crate::search::SearchConfig;

/// Run the solver on one cluster lattice and decode its output
///
/// Invocation is `<solver> -q <query> -l <lattice> -o <out>` with the output
/// file placed in a scratch directory that is removed on return. The child
/// is killed when the wall-clock budget runs out.
pub(crate) async fn run_solver(
    config: &SearchConfig,
    query_path: &Path,
    lattice_path: &Path,
) -> Result<SearchResultsFile> {
    let scratch = tempfile::tempdir()?;
    let out_path = scratch.path().join("results.bin");

    debug!(
        solver = %config.solver_path.display(),
        lattice = %lattice_path.display(),
        "invoking solver"
    );

    let child = Command::new(&config.solver_path)
        .arg("-q")
        .arg(query_path)
        .arg("-l")
        .arg(lattice_path)
        .arg("-o")
        .arg(&out_path)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let output = match timeout(config.timeout, child.wait_with_output()).await {
        Ok(done) => done?,
        Err(_) => {
            return Err(Error::SolverTimeout {
                timeout_secs: config.timeout.as_secs(),
                lattice: lattice_path.to_path_buf(),
            });
        }
    };

    if !output.status.success() {
        return Err(Error::SolverFailure {
            status: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    let bytes = tokio::fs::read(&out_path).await?;
    SearchResultsFile::from_bytes(&bytes)
}
