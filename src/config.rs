//! Configuração do jobflow carregada a partir de `jobflow.toml`.
//!
//! A struct [`JobflowConfig`] contém todos os parâmetros configuráveis:
//! endereços e timeouts dos sub-serviços, o serviço de interpretação,
//! o serviço de resolução de CAPTCHA, a política de retentativas e os
//! limites do workflow. Valores não presentes no arquivo usam defaults
//! sensíveis. As variáveis de ambiente `JOBFLOW_INTERPRETER_API_KEY` e
//! `JOBFLOW_CAPTCHA_API_KEY` têm precedência sobre o arquivo.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::JobflowError;
use crate::state_machine::RetryConfig;

/// Nome lógico do sub-serviço de scraping.
pub const SCRAPING: &str = "scraping";
/// Nome lógico do sub-serviço de estatísticas de trabalho.
pub const LABOR_STATS: &str = "labor_stats";
/// Nome lógico do sub-serviço de salários.
pub const SALARY: &str = "salary";

/// Configuração de nível superior carregada de `jobflow.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobflowConfig {
    /// Endereços e timeouts dos sub-serviços remotos.
    #[serde(default)]
    pub services: ServicesConfig,

    /// Serviço primário de interpretação de consultas.
    #[serde(default)]
    pub interpreter: InterpreterConfig,

    /// Serviço externo de resolução de CAPTCHA.
    #[serde(default)]
    pub captcha: CaptchaConfig,

    /// Retentativas do estágio de scraping.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Limites gerais de cada execução.
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

/// Os três sub-serviços conhecidos pelo workflow.
#[derive(Debug, Clone, Deserialize)]
pub struct ServicesConfig {
    #[serde(default = "default_scraping_service")]
    pub scraping: ServiceConfig,
    #[serde(default = "default_labor_stats_service")]
    pub labor_stats: ServiceConfig,
    #[serde(default = "default_salary_service")]
    pub salary: ServiceConfig,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            scraping: default_scraping_service(),
            labor_stats: default_labor_stats_service(),
            salary: default_salary_service(),
        }
    }
}

impl ServicesConfig {
    /// Itera sobre `(nome lógico, configuração)` de cada sub-serviço.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &ServiceConfig)> {
        [
            (SCRAPING, &self.scraping),
            (LABOR_STATS, &self.labor_stats),
            (SALARY, &self.salary),
        ]
        .into_iter()
    }
}

/// Endereço e timeout padrão de um sub-serviço.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// URL base do sub-serviço (ex.: "http://127.0.0.1:8001").
    pub address: String,

    /// Timeout padrão de cada chamada, em milissegundos.
    #[serde(default = "default_service_timeout_ms")]
    pub timeout_ms: u64,

    /// Operações anunciadas pelo sub-serviço.
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl ServiceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Configuração do serviço primário de interpretação.
#[derive(Debug, Clone, Deserialize)]
pub struct InterpreterConfig {
    /// Endpoint HTTP do serviço. `None` desativa o caminho primário e
    /// força o uso da heurística local.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Credencial enviada como `Bearer` token.
    #[serde(default)]
    pub api_key: String,

    /// Timeout de cada chamada de interpretação, em milissegundos.
    #[serde(default = "default_interpreter_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: String::new(),
            timeout_ms: default_interpreter_timeout_ms(),
        }
    }
}

impl InterpreterConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Configuração do serviço de resolução de CAPTCHA (compatível com 2captcha).
#[derive(Debug, Clone, Deserialize)]
pub struct CaptchaConfig {
    /// Chave da API do serviço de resolução.
    #[serde(default)]
    pub api_key: String,

    /// URL de submissão de desafios.
    #[serde(default = "default_captcha_submit_url")]
    pub submit_url: String,

    /// URL de consulta de resultados.
    #[serde(default = "default_captcha_result_url")]
    pub result_url: String,

    /// Intervalo fixo entre consultas, em milissegundos.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Orçamento de tempo de parede por desafio, em milissegundos.
    #[serde(default = "default_poll_budget_ms")]
    pub poll_budget_ms: u64,

    /// Máximo de tentativas de resolução por execução de scraping.
    #[serde(default = "default_captcha_max_attempts")]
    pub max_attempts: u32,

    /// Timeout de cada requisição HTTP ao serviço de resolução.
    #[serde(default = "default_captcha_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            submit_url: default_captcha_submit_url(),
            result_url: default_captcha_result_url(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_budget_ms: default_poll_budget_ms(),
            max_attempts: default_captcha_max_attempts(),
            request_timeout_ms: default_captcha_request_timeout_ms(),
        }
    }
}

impl CaptchaConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_budget(&self) -> Duration {
        Duration::from_millis(self.poll_budget_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Limites de cada execução do workflow.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowConfig {
    /// Confiança mínima para sair do estado `Validating`.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Número máximo de vagas pedidas ao sub-serviço de scraping.
    #[serde(default = "default_max_results")]
    pub max_results: u32,

    /// Timeout do estágio de enriquecimento inteiro, em milissegundos.
    #[serde(default = "default_enrichment_timeout_ms")]
    pub enrichment_timeout_ms: u64,

    /// Orçamento de tempo de parede de uma execução, em milissegundos.
    #[serde(default = "default_run_timeout_ms")]
    pub run_timeout_ms: u64,

    /// Tempo até um sub-serviço marcado como indisponível voltar a ser elegível.
    #[serde(default = "default_registry_cooldown_ms")]
    pub registry_cooldown_ms: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            max_results: default_max_results(),
            enrichment_timeout_ms: default_enrichment_timeout_ms(),
            run_timeout_ms: default_run_timeout_ms(),
            registry_cooldown_ms: default_registry_cooldown_ms(),
        }
    }
}

impl WorkflowConfig {
    pub fn enrichment_timeout(&self) -> Duration {
        Duration::from_millis(self.enrichment_timeout_ms)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_millis(self.run_timeout_ms)
    }

    pub fn registry_cooldown(&self) -> Duration {
        Duration::from_millis(self.registry_cooldown_ms)
    }
}

// Scraping é lento (navegador + possível CAPTCHA): 180s.
fn default_scraping_service() -> ServiceConfig {
    ServiceConfig {
        address: "http://127.0.0.1:8001".to_string(),
        timeout_ms: 180_000,
        capabilities: vec!["scrape_jobs".to_string()],
    }
}

fn default_labor_stats_service() -> ServiceConfig {
    ServiceConfig {
        address: "http://127.0.0.1:8002".to_string(),
        timeout_ms: 30_000,
        capabilities: vec!["search_job".to_string()],
    }
}

fn default_salary_service() -> ServiceConfig {
    ServiceConfig {
        address: "http://127.0.0.1:8003".to_string(),
        timeout_ms: 120_000,
        capabilities: vec!["salary_compensation".to_string()],
    }
}

fn default_service_timeout_ms() -> u64 {
    30_000
}

fn default_interpreter_timeout_ms() -> u64 {
    20_000
}

fn default_captcha_submit_url() -> String {
    "https://2captcha.com/in.php".to_string()
}

fn default_captcha_result_url() -> String {
    "https://2captcha.com/res.php".to_string()
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

fn default_poll_budget_ms() -> u64 {
    120_000
}

fn default_captcha_max_attempts() -> u32 {
    3
}

fn default_captcha_request_timeout_ms() -> u64 {
    15_000
}

fn default_confidence_threshold() -> f64 {
    0.5
}

fn default_max_results() -> u32 {
    10
}

fn default_enrichment_timeout_ms() -> u64 {
    90_000
}

fn default_run_timeout_ms() -> u64 {
    600_000
}

fn default_registry_cooldown_ms() -> u64 {
    1_000
}

impl JobflowConfig {
    /// Carrega a configuração de `jobflow.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load() -> Result<Self, JobflowError> {
        Self::load_from(Path::new("jobflow.toml"))
    }

    /// Carrega a configuração do caminho informado, com os mesmos
    /// defaults e sobrescritas de ambiente de [`JobflowConfig::load`].
    pub fn load_from(path: &Path) -> Result<Self, JobflowError> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<JobflowConfig>(&contents)?
        } else {
            Self::default()
        };

        // Variáveis de ambiente têm precedência sobre o arquivo para as credenciais.
        if let Ok(key) = std::env::var("JOBFLOW_INTERPRETER_API_KEY")
            && !key.is_empty()
        {
            config.interpreter.api_key = key;
        }
        if let Ok(key) = std::env::var("JOBFLOW_CAPTCHA_API_KEY")
            && !key.is_empty()
        {
            config.captcha.api_key = key;
        }

        config.validate()?;
        Ok(config)
    }

    /// Rejeita combinações que tornariam o workflow incapaz de terminar.
    pub fn validate(&self) -> Result<(), JobflowError> {
        if !(0.0..=1.0).contains(&self.workflow.confidence_threshold) {
            return Err(JobflowError::Config(format!(
                "workflow.confidence_threshold must be within 0..=1, got {}",
                self.workflow.confidence_threshold
            )));
        }
        if self.captcha.poll_interval_ms == 0 {
            return Err(JobflowError::Config(
                "captcha.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.workflow.run_timeout_ms == 0 {
            return Err(JobflowError::Config(
                "workflow.run_timeout_ms must be greater than zero".to_string(),
            ));
        }
        for (name, service) in self.services.iter() {
            if service.address.trim().is_empty() {
                return Err(JobflowError::Config(format!(
                    "services.{name}.address must not be empty"
                )));
            }
        }
        Ok(())
    }
}
