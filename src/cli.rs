//! Interface de linha de comando do jobflow baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (run, services)
//! e flags globais (--config, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// jobflow: transforma uma consulta de vagas em texto livre em vagas
/// enriquecidas com dados salariais e estatísticas de trabalho.
#[derive(Debug, Parser)]
#[command(name = "jobflow", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho do arquivo de configuração.
    #[arg(long, global = true, default_value = "jobflow.toml")]
    pub config: PathBuf,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Executa o workflow para uma consulta (Ctrl-C cancela a execução).
    Run {
        /// Consulta em texto livre, ex.: "software engineer in Austin".
        query: String,

        /// Dica estruturada de cargo.
        #[arg(long)]
        title: Option<String>,

        /// Dica estruturada de localização.
        #[arg(long)]
        location: Option<String>,

        /// Número máximo de vagas pedidas ao scraping.
        #[arg(long)]
        max_results: Option<u32>,

        /// Imprime a execução final em JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Lista os sub-serviços registrados e sua disponibilidade.
    Services,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_run_subcommand() {
        let cli = Cli::parse_from(["jobflow", "run", "software engineer in Austin"]);
        match cli.command {
            Command::Run {
                query,
                title,
                location,
                max_results,
                json,
            } => {
                assert_eq!(query, "software engineer in Austin");
                assert!(title.is_none());
                assert!(location.is_none());
                assert!(max_results.is_none());
                assert!(!json);
            }
            _ => panic!("expected Run command"),
        }
        assert_eq!(cli.config, PathBuf::from("jobflow.toml"));
    }

    #[test]
    fn cli_parses_hints_and_output_flags() {
        let cli = Cli::parse_from([
            "jobflow",
            "run",
            "nurse jobs",
            "--title",
            "Registered Nurse",
            "--location",
            "Denver, CO",
            "--max-results",
            "5",
            "--json",
        ]);
        match cli.command {
            Command::Run {
                title,
                location,
                max_results,
                json,
                ..
            } => {
                assert_eq!(title.as_deref(), Some("Registered Nurse"));
                assert_eq!(location.as_deref(), Some("Denver, CO"));
                assert_eq!(max_results, Some(5));
                assert!(json);
            }
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::parse_from([
            "jobflow",
            "--config",
            "/etc/jobflow.toml",
            "--verbose",
            "services",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.config, PathBuf::from("/etc/jobflow.toml"));
        assert!(matches!(cli.command, Command::Services));
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
