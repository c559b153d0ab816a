use std::fs::File;
use std::io::{BufWriter, Write};
use std::net::{Ipv4Addr, SocketAddrV4, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use dcmlink_core::DicomObject;
use dcmlink_dictionary_std::uids;
use dcmlink_ul::association::{
    AcceptAny, CommandContext, DataSetReader, HandlerError, ServiceClassProvider,
    VerificationProvider,
};
use dcmlink_ul::dimse;
use dcmlink_ul::ServerAssociationOptions;
use snafu::{Report, ResultExt, Whatever};
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// DICOM C-STORE SCP
#[derive(Debug, Parser)]
#[command(version)]
struct App {
    /// Verbose mode
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
    /// Application Entity title of this SCP
    #[arg(long = "ae-title", default_value = "STORE-SCP")]
    ae_title: String,
    /// Enforce max pdu length
    #[arg(short = 's', long = "strict")]
    strict: bool,
    /// Maximum PDU length
    #[arg(
        short = 'm',
        long = "max-pdu-length",
        default_value = "16384",
        value_parser(clap::value_parser!(u32).range(1024..))
    )]
    max_pdu_length: u32,
    /// Output directory for incoming objects
    #[arg(short = 'o', default_value = ".")]
    out_dir: PathBuf,
    /// Which port to listen on
    #[arg(short, default_value = "11111")]
    port: u16,
    /// Socket read and write timeout in seconds
    #[arg(
        short = 't',
        long = "timeout",
        default_value = "30",
        value_parser(clap::value_parser!(u64).range(1..))
    )]
    timeout: u64,
}

/// Writes the data set of every C-STORE request
/// to `<SOP Instance UID>.dcm` in the output directory.
#[derive(Debug)]
struct StorageProvider {
    out_dir: PathBuf,
}

impl StorageProvider {
    fn store(&self, sop_instance_uid: &str, data_set: &mut DataSetReader) -> std::io::Result<PathBuf> {
        let path = self.out_dir.join(file_name(sop_instance_uid));
        let mut file = BufWriter::new(File::create(&path)?);
        std::io::copy(data_set, &mut file)?;
        file.flush()?;
        Ok(path)
    }
}

fn file_name(sop_instance_uid: &str) -> String {
    let name: String = sop_instance_uid
        .chars()
        .map(|c| if c.is_ascii_digit() || c == '.' { c } else { '_' })
        .collect();
    format!("{}.dcm", name)
}

impl ServiceClassProvider for StorageProvider {
    fn sop_class_uids(&self) -> &[&str] {
        uids::STORAGE_SOP_CLASSES
    }

    fn process_command(
        &self,
        context: &mut CommandContext<'_>,
        command: &DicomObject,
        data_set: Option<DataSetReader>,
    ) -> Result<(), HandlerError> {
        let field = dimse::command_field(command)?;
        if field != dimse::C_STORE_RQ {
            return Err(format!("unsupported command field {:#06x}", field).into());
        }
        let message_id = dimse::message_id(command)?;
        let sop_class_uid = dimse::affected_sop_class_uid(command)?;
        let sop_instance_uid = dimse::affected_sop_instance_uid(command)?;
        let mut data_set = data_set.ok_or("C-STORE request without a data set")?;
        debug!(
            "C-STORE-RQ #{} for {} in transfer syntax {}",
            message_id,
            sop_instance_uid,
            data_set.transfer_syntax().uid()
        );

        let status = match self.store(&sop_instance_uid, &mut data_set) {
            Ok(path) => {
                info!("Stored {}", path.display());
                dimse::STATUS_SUCCESS
            }
            // the peer is gone, nobody to reply to
            Err(e) if e.kind() == std::io::ErrorKind::ConnectionAborted => return Err(e.into()),
            Err(e) => {
                warn!("Could not store {}: {}", sop_instance_uid, e);
                dimse::STATUS_OUT_OF_RESOURCES
            }
        };

        context.write_command(&dimse::c_store_rsp(
            message_id,
            &sop_class_uid,
            &sop_instance_uid,
            status,
        ))?;
        Ok(())
    }
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

fn run(args: App) -> Result<(), Whatever> {
    std::fs::create_dir_all(&args.out_dir)
        .whatever_context("Could not create output directory")?;

    let options: ServerAssociationOptions<'static, AcceptAny> = ServerAssociationOptions::new()
        .accept_any()
        .ae_title(args.ae_title.clone())
        .strict(args.strict)
        .max_pdu_length(args.max_pdu_length)
        .read_timeout(Duration::from_secs(args.timeout))
        .write_timeout(Duration::from_secs(args.timeout))
        .with_provider(Arc::new(VerificationProvider))
        .with_provider(Arc::new(StorageProvider {
            out_dir: args.out_dir.clone(),
        }));
    let options = Arc::new(options);

    let listen_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, args.port);
    let listener = TcpListener::bind(listen_addr)
        .with_whatever_context(|_| format!("Could not bind to {}", listen_addr))?;
    info!("{} listening on: tcp://{}", &args.ae_title, listen_addr);

    for stream in listener.incoming() {
        match stream {
            Ok(scu_stream) => {
                let options = Arc::clone(&options);
                std::thread::spawn(move || {
                    if let Err(e) = serve(scu_stream, &options) {
                        error!("{}", Report::from_error(e));
                    }
                });
            }
            Err(e) => {
                error!("{}", Report::from_error(e));
            }
        }
    }

    Ok(())
}

fn serve(
    scu_stream: TcpStream,
    options: &ServerAssociationOptions<'static, AcceptAny>,
) -> Result<(), Whatever> {
    let mut association = options
        .establish(scu_stream)
        .whatever_context("Could not establish association")?;
    info!(
        "New association from {} ({:?})",
        association.peer_ae_title(),
        association.peer_addr().ok()
    );
    association
        .serve()
        .whatever_context("Association ended with an error")?;
    info!("Association with {} ended", association.peer_ae_title());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{file_name, App};
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        App::command().debug_assert();
    }

    #[test]
    fn file_names_keep_uid_characters() {
        assert_eq!(file_name("1.2.840.10008.99"), "1.2.840.10008.99.dcm");
        assert_eq!(file_name("1.2/../3"), "1.2_.._3.dcm");
    }
}
