use std::path::PathBuf;

use crate::Result;

pub struct Config {
    pub debug_logging: bool,
    pub proj_db_search_location: Option<PathBuf>,
    pub config_options: Vec<(String, String)>,
}

impl Config {
    pub fn apply(&self) -> Result<()> {
        setup_logging(self.debug_logging);
        if let Some(proj_db_path) = &self.proj_db_search_location {
            let proj_db_path = proj_db_path.to_string_lossy().to_string();
            if !proj_db_path.is_empty() {
                gdal::config::set_config_option("PROJ_DATA", proj_db_path.as_str())?;
            }
        }

        for (key, value) in &self.config_options {
            gdal::config::set_config_option(key, value)?;
        }

        Ok(())
    }
}

/// Route the GDAL diagnostic output to the `log` facade
pub fn setup_logging(debug: bool) {
    if debug && gdal::config::set_config_option("CPL_DEBUG", "ON").is_err() {
        log::debug!("Failed to set GDAL debug level")
    }

    gdal::config::set_error_handler(|sev, _ec, msg| {
        use gdal::errors::CplErrType;
        match sev {
            CplErrType::Debug => log::debug!("GDAL: {msg}"),
            CplErrType::Warning => log::warn!("GDAL: {msg}"),
            CplErrType::Failure | CplErrType::Fatal => log::error!("GDAL: {msg}"),
            CplErrType::None => {}
        }
    });
}
