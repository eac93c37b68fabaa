use ::tracing::trace;
use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use rusty_fork::rusty_fork_test;

use s3mirror::CLIArgs;
use s3mirror::Config;

mod cli;
mod tracing;

#[cfg(not(tarpaulin_include))]
#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config_exit_if_err();

    if let Some(shell) = config.auto_complete_shell {
        generate(
            shell,
            &mut CLIArgs::command(),
            "s3mirror",
            &mut std::io::stdout(),
        );

        return Ok(());
    }

    if config.show_config {
        println!("{config:#?}");

        return Ok(());
    }

    start_tracing_if_necessary(&config)?;

    trace!("config = {:?}", config);

    let exit_code = cli::run(config).await?;
    if exit_code != cli::EXIT_CODE_SUCCESS {
        std::process::exit(exit_code);
    }

    Ok(())
}

#[cfg(not(tarpaulin_include))]
fn load_config_exit_if_err() -> Config {
    match Config::try_from(CLIArgs::parse()) {
        Ok(config) => config,
        Err(error_message) => {
            let _ = clap::Error::raw(clap::error::ErrorKind::ValueValidation, error_message)
                .format(&mut CLIArgs::command())
                .print();
            std::process::exit(cli::EXIT_CODE_INVALID_ARGS);
        }
    }
}

fn start_tracing_if_necessary(config: &Config) -> Result<bool> {
    let Some(tracing_config) = config.tracing_config.as_ref() else {
        return Ok(false);
    };

    tracing::init_tracing(tracing_config)?;
    Ok(true)
}

rusty_fork_test! {
    #[test]
    fn with_tracing() {
        let args = vec![
            "unittest",
            "--source-profile",
            "source_profile",
            "--target-profile",
            "target_profile",
        ];

        let config = s3mirror::Config::try_from(CLIArgs::try_parse_from(args).unwrap()).unwrap();
        assert!(start_tracing_if_necessary(&config).unwrap());
    }

    #[test]
    fn without_tracing() {
        let args = vec![
            "unittest",
            "--source-profile",
            "source_profile",
            "--target-profile",
            "target_profile",
            "-qq",
        ];

        let config = s3mirror::Config::try_from(CLIArgs::try_parse_from(args).unwrap()).unwrap();
        assert!(!start_tracing_if_necessary(&config).unwrap());
    }

    #[test]
    fn with_log_file_tracing() {
        let log_file = std::env::temp_dir().join(format!("s3mirror-{}.log", std::process::id()));
        let args = vec![
            "unittest".to_string(),
            "--source-profile".to_string(),
            "source_profile".to_string(),
            "--target-profile".to_string(),
            "target_profile".to_string(),
            "--log-file".to_string(),
            log_file.to_string_lossy().to_string(),
        ];

        let config = s3mirror::Config::try_from(CLIArgs::try_parse_from(args).unwrap()).unwrap();
        assert!(start_tracing_if_necessary(&config).unwrap());
        assert!(log_file.exists());

        let _ = std::fs::remove_file(log_file);
    }
}
