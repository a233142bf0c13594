//! Tipos de erro para o cliente da API de completions.
//!
//! Define [`LlmError`] com variantes para credencial ausente, falha de rede,
//! erro HTTP da API, corpo inválido e resposta truncada. Usa `thiserror`
//! para derivar `Display` e `Error` a partir dos atributos `#[error(...)]`.

use thiserror::Error;

/// Erros que podem ocorrer ao chamar a API de completions.
///
/// Nenhuma variante é retentada nesta camada; a política de retry, se houver,
/// pertence a quem chama.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Nenhuma chave de API na requisição nem no default do processo.
    #[error("no API key configured for the completion API")]
    Auth,

    /// A requisição não informou o modelo.
    #[error("no model specified for the completion request")]
    MissingModel,

    /// Falha de rede subjacente (DNS, conexão recusada, timeout de transporte).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A API respondeu com status diferente de 200.
    /// Contém o código HTTP e o corpo bruto da resposta.
    #[error("upstream API error (status {status}): {body}")]
    Upstream { status: u16, body: String },

    /// O corpo da resposta não é JSON válido ou não tem o formato esperado.
    #[error("malformed completion response: {0}")]
    ResponseFormat(String),

    /// O modelo parou por limite de tokens (`finish_reason: "length"`).
    /// O conteúdo parcial é descartado; só o tamanho é preservado para diagnóstico.
    #[error("completion truncated by the token limit after {partial_len} characters")]
    Truncated { partial_len: usize },
}
