pub mod decode;
pub mod render_map;

use std::path::Path;

use log::{error, info};

use crate::errors::Result;

/// One stage of the pipeline. `process` runs extract/transform/load with
/// structured logging, skipping the whole stage when its outputs already
/// exist in the working directory.
pub trait Stage {
    type Input;
    type Output;

    fn name(&self) -> &str;

    fn is_cached(&self, dir: &Path) -> Result<bool>;

    fn extract(&mut self, dir: &Path) -> Result<Self::Input>;
    fn transform(&mut self, input: Self::Input) -> Result<Self::Output>;
    fn load(&mut self, dir: &Path, output: Self::Output) -> Result<()>;

    fn process(&mut self, dir: &Path) -> Result<()> {
        info!(stage = self.name(); "Starting stage");
        if self.is_cached(dir)? {
            info!(stage = self.name(); "Using cached output");
        } else {
            info!(stage = self.name(); "Extracting");
            let input = match self.extract(dir) {
                Ok(input) => Ok(input),
                Err(err) => {
                    error!(stage = self.name(), err = err.message; "Extraction failed with error");
                    Err(err)
                }
            }?;

            info!(stage = self.name(); "Transforming");
            let output = match self.transform(input) {
                Ok(output) => Ok(output),
                Err(err) => {
                    error!(stage = self.name(), err = err.message; "Transformation failed with error");
                    Err(err)
                }
            }?;

            info!(stage = self.name(); "Loading");
            match self.load(dir, output) {
                Ok(_) => Ok(()),
                Err(err) => {
                    error!(stage = self.name(), err = err.message; "Loading failed with error");
                    Err(err)
                }
            }?;
        }
        info!(stage = self.name(); "Stage finished");
        Ok(())
    }
}
