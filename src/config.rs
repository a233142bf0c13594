//! Configuração do serviço carregada a partir de `dialogen.toml`.
//!
//! A struct [`AppConfig`] contém todos os parâmetros do processo.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! As variáveis de ambiente `OPENAI_API_KEY` e `DIALOGEN_BIND` têm precedência
//! sobre o arquivo.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::DialogenError;
use crate::llm::client::API_URL;

/// Nome do arquivo de configuração procurado no diretório atual.
pub const DEFAULT_CONFIG_FILE: &str = "dialogen.toml";

/// Backend de persistência dos jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Tabela em memória; os jobs morrem com o processo.
    #[default]
    Memory,
    /// Um documento JSON por job em `store_dir`.
    File,
}

/// Configuração de nível superior carregada de `dialogen.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Chave padrão da API de completions, usada quando a requisição não traz uma.
    #[serde(default)]
    pub api_key: String,

    /// Endpoint de chat completions.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Endereço onde o servidor HTTP escuta.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default)]
    pub store: StoreKind,

    /// Diretório do backend `file`.
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,

    /// Segundos sem atualização até um job em processamento ser sinalizado.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Timeout de transporte do cliente HTTP compartilhado.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_api_url() -> String {
    API_URL.to_string()
}

// Escuta em todas as interfaces na porta 3000.
fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("jobs")
}

// Cinco minutos.
fn default_stale_after_secs() -> u64 {
    300
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    300
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_url: default_api_url(),
            bind_addr: default_bind_addr(),
            store: StoreKind::default(),
            store_dir: default_store_dir(),
            stale_after_secs: default_stale_after_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl AppConfig {
    /// Carrega a configuração de `path`, ou de `dialogen.toml` no diretório atual.
    ///
    /// Sem caminho explícito, um arquivo ausente resulta nos valores padrão;
    /// com caminho explícito, a ausência é erro.
    pub fn load(path: Option<&Path>) -> Result<Self, DialogenError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::from_file(path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, DialogenError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            DialogenError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Ok(toml::from_str::<AppConfig>(&contents)?)
    }

    /// Variáveis de ambiente não vazias sobrescrevem o arquivo.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("OPENAI_API_KEY")
            && !key.is_empty()
        {
            self.api_key = key;
        }
        if let Some(bind) = lookup("DIALOGEN_BIND")
            && !bind.is_empty()
        {
            self.bind_addr = bind;
        }
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, DialogenError> {
        self.bind_addr.parse().map_err(|e| {
            DialogenError::Config(format!("invalid bind address '{}': {e}", self.bind_addr))
        })
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.stale_after_secs).unwrap_or(i64::MAX))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
