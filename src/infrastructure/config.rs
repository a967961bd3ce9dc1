// Datasource configuration loading
use crate::error::Result;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct DatasourceConfig {
    pub datasource: DatasourceSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatasourceSettings {
    pub url: String,
    #[serde(default)]
    pub topic_filters: Vec<String>,
}

pub fn load_datasource_config() -> Result<DatasourceConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/datasource"))
        .build()?;

    Ok(settings.try_deserialize()?)
}
