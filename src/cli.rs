//! Interface de linha de comando do dialogen baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (serve, generate)
//! e flags globais (--config-file, --verbose).

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// dialogen: gerador de diálogos sintéticos entre tutor e estudante.
#[derive(Debug, Parser)]
#[command(name = "dialogen", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho para o arquivo de configuração (padrão: `dialogen.toml`).
    #[arg(long, global = true)]
    pub config_file: Option<PathBuf>,

    /// Habilita saída detalhada (nível debug).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sobe a API HTTP de geração.
    Serve {
        /// Endereço de escuta; sobrescreve `bind_addr` e `DIALOGEN_BIND`.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Gera uma conversa de forma síncrona a partir de um arquivo JSON.
    Generate {
        /// Arquivo JSON com a configuração da geração.
        config: PathBuf,

        /// Grava o resultado neste arquivo em vez da saída padrão.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}
