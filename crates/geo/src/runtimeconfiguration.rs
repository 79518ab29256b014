use std::path::Path;

use bon::bon;
use inf::gdalinterop;

use crate::Result;

/// Process wide GDAL configuration, apply it once before running any operation
pub struct RuntimeConfiguration {
    gdal_config: gdalinterop::Config,
}

#[bon]
impl RuntimeConfiguration {
    #[builder]
    pub fn new(proj_db: Option<&Path>, gdal_debug_log: Option<bool>, #[builder(default)] config_options: Vec<(String, String)>) -> Self {
        Self {
            gdal_config: gdalinterop::Config {
                debug_logging: gdal_debug_log.unwrap_or(false),
                proj_db_search_location: proj_db.map(Path::to_path_buf),
                config_options,
            },
        }
    }

    pub fn apply(&self) -> Result<()> {
        self.gdal_config.apply()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn apply_configuration() -> Result<()> {
        let config = RuntimeConfiguration::builder()
            .gdal_debug_log(false)
            .config_options(vec![("GDAL_NUM_THREADS".to_string(), "1".to_string())])
            .build();
        config.apply()?;
        assert_eq!(gdal::config::get_config_option("GDAL_NUM_THREADS", "")?, "1");
        Ok(())
    }
}
