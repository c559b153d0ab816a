use clap::Parser;
use dcmlink_ul::association::VerificationUser;
use dcmlink_ul::ClientAssociationOptions;
use snafu::{Report, ResultExt, Whatever};
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

/// DICOM C-ECHO SCU
#[derive(Debug, Parser)]
#[command(version)]
struct App {
    /// socket address to SCP (example: "127.0.0.1:104")
    addr: String,
    /// verbose mode
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
    /// the C-ECHO message ID
    #[arg(short = 'm', long = "message-id", default_value = "1")]
    message_id: u16,
    /// the calling AE title
    #[arg(long = "calling-ae-title", default_value = "ECHOSCU")]
    calling_ae_title: String,
    /// the called AE title
    #[arg(long = "called-ae-title", default_value = "ANY-SCP")]
    called_ae_title: String,
    /// the maximum PDU length accepted from the SCP
    #[arg(
        long = "max-pdu-length",
        default_value = "16384",
        value_parser(clap::value_parser!(u32).range(1024..))
    )]
    max_pdu_length: u32,
}

fn main() {
    let app = App::parse();

    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(if app.verbose { Level::DEBUG } else { Level::INFO })
            .with_env_filter(EnvFilter::from_default_env().add_directive(if app.verbose {
                Level::DEBUG.into()
            } else {
                Level::INFO.into()
            }))
            .finish(),
    )
    .whatever_context("Could not set up global logging subscriber")
    .unwrap_or_else(|e: Whatever| {
        eprintln!("[ERROR] {}", Report::from_error(e));
    });

    run(app).unwrap_or_else(|e| {
        error!("{}", Report::from_error(e));
        std::process::exit(-2);
    });
}

fn run(app: App) -> Result<(), Whatever> {
    let App {
        addr,
        verbose: _,
        message_id,
        calling_ae_title,
        called_ae_title,
        max_pdu_length,
    } = app;

    let mut association = ClientAssociationOptions::new()
        .calling_ae_title(calling_ae_title)
        .called_ae_title(called_ae_title)
        .max_pdu_length(max_pdu_length)
        .with_service_user(&VerificationUser)
        .establish(&addr)
        .whatever_context("Could not establish association with SCP")?;

    info!("Association with {} successful", addr);

    let status = VerificationUser
        .echo(&mut association, message_id)
        .whatever_context("C-ECHO failed")?;
    info!("C-ECHO successful (msg id {}, status {:#06x})", message_id, status);

    association
        .release()
        .whatever_context("Could not release association")?;
    Ok(())
}
