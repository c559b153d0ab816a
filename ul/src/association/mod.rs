//! DICOM association module
//!
//! This module contains utilities for establishing associations
//! between DICOM nodes via TCP/IP
//! and exchanging DIMSE messages once they are established.
//!
//! As an association requester, often as a service class user (SCU),
//! a new association can be started
//! via the [`ClientAssociationOptions`] type.
//! As an association acceptor,
//! usually taking the role of a service class provider (SCP),
//! a newly created [TCP stream][1] can be passed to
//! a previously prepared [`ServerAssociationOptions`].
//!
//! Both ends yield an [`Association`],
//! through which commands and data sets are sent and received.
//! An acceptor may hand control of the association
//! to its service class providers with [`Association::serve`].
//!
//! [1]: std::net::TcpStream
pub mod client;
mod dispatch;
mod peer;
pub mod pdata;
pub mod server;
pub mod service;
mod uid;

pub use client::ClientAssociationOptions;
pub use pdata::PDataWriter;
pub use server::{AcceptAny, AcceptCalledAeTitle, AccessControl, ServerAssociationOptions};
pub use service::{
    CommandContext, DataSetReader, HandlerError, ServiceClassProvider, ServiceClassUser,
    VerificationProvider, VerificationUser,
};

use std::collections::VecDeque;
use std::fmt;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use dcmlink_core::{DataDictionary, DicomObject};
use dcmlink_encoding::transfer_syntax::{self, TransferSyntax, IMPLICIT_VR_LITTLE_ENDIAN};
use dcmlink_encoding::{read_object, VrWriter};
use snafu::{ensure, OptionExt, ResultExt, Snafu};
use tracing::{debug, warn};

use crate::dimse;
use crate::pdu::{
    read_pdu, write_pdu, AbortRQServiceProviderReason, AbortRQSource, AssociationRJ, PDataValue,
    PDataValueType, Pdu, PresentationContextResultReason, ReadError, WriteError,
};
use uid::uid_eq;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// missing abstract syntax to begin negotiation
    MissingAbstractSyntax,

    #[snafu(display("{} presentation contexts do not fit in odd 8-bit identifiers", count))]
    TooManyPresentationContexts { count: usize },

    /// could not connect to peer
    Connect { source: std::io::Error },

    /// could not set the socket read timeout
    SetReadTimeout { source: std::io::Error },

    /// could not set the socket write timeout
    SetWriteTimeout { source: std::io::Error },

    /// could not clone the socket for writing
    CloneSocket { source: std::io::Error },

    /// failed to encode PDU message
    SendPdu { source: WriteError },

    /// failed to send PDU message on wire
    WireSend { source: std::io::Error },

    /// failed to receive PDU message
    ReceivePdu { source: ReadError },

    /// the peer closed the connection
    ConnectionClosed,

    #[snafu(display("unexpected PDU from peer `{}`", pdu.short_description()))]
    UnexpectedPdu {
        /// the PDU obtained from the peer
        pdu: Box<Pdu>,
    },

    #[snafu(display("unknown PDU from peer `{:?}`", pdu))]
    UnknownPdu {
        /// the PDU obtained from the peer, of variant Unknown
        pdu: Box<Pdu>,
    },

    #[snafu(display("protocol version mismatch: expected {}, got {}", expected, got))]
    ProtocolVersionMismatch { expected: u16, got: u16 },

    #[snafu(display("association rejected by the peer: {}", association_rj.source))]
    Rejected { association_rj: AssociationRJ },

    /// no presentation contexts accepted by the peer
    NoAcceptedPresentationContexts,

    /// the association was aborted
    Aborted,

    #[snafu(display("no accepted presentation context with ID {}", id))]
    NoSuchPresentationContext { id: u8 },

    #[snafu(display("no accepted presentation context for abstract syntax {}", abstract_syntax))]
    NoPresentationContextFor { abstract_syntax: String },

    #[snafu(display("transfer syntax {} is not supported", uid))]
    UnsupportedTransferSyntax { uid: String },

    #[snafu(display("expected a {:?} fragment, got a {:?} fragment", expected, got))]
    UnexpectedValueType {
        expected: PDataValueType,
        got: PDataValueType,
    },

    #[snafu(display(
        "message fragments on presentation context {} while reading one on {}",
        got,
        expected
    ))]
    MixedPresentationContexts { expected: u8, got: u8 },

    /// failed to encode DIMSE message
    EncodeMessage { source: dcmlink_encoding::encode::Error },

    /// failed to decode DIMSE message
    DecodeMessage { source: dcmlink_encoding::decode::Error },

    /// invalid command set
    InvalidCommand { source: dimse::Error },

    #[snafu(display("no service class provider for abstract syntax {}", abstract_syntax))]
    NoProvider { abstract_syntax: String },

    /// service class provider failed to process a command
    Handler { source: HandlerError },

    /// service class provider panicked while processing a command
    HandlerPanicked,

    /// unexpected status in response
    #[snafu(display("unexpected response status {:#06x}", status))]
    UnexpectedStatus { status: u16 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The outcome of negotiating one presentation context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PresentationContextNegotiated {
    /// the presentation context identifier
    pub id: u8,
    /// the abstract syntax UID proposed by the requester
    pub abstract_syntax: String,
    /// the accepted transfer syntax UID,
    /// empty or meaningless if the context was not accepted
    pub transfer_syntax: String,
    /// the negotiation result
    pub reason: PresentationContextResultReason,
}

impl PresentationContextNegotiated {
    pub fn is_accepted(&self) -> bool {
        self.reason == PresentationContextResultReason::Acceptance
    }
}

/// An association over a TCP connection,
/// with the writing half being a clone of the socket.
pub type TcpAssociation = Association<TcpStream, TcpStream>;

/// Whatever arrived from the peer next,
/// in terms of presentation data values.
#[derive(Debug)]
enum Incoming {
    Value(PDataValue),
    ReleaseRequest,
    Abort(AbortRQSource),
    Closed,
    Other(Pdu),
}

/// The reading half of an association.
#[derive(Debug)]
struct PduSource<R> {
    reader: R,
    pending: VecDeque<PDataValue>,
    max_pdu_length: u32,
    strict: bool,
}

impl<R> PduSource<R>
where
    R: Read,
{
    fn receive(&mut self) -> Result<Pdu> {
        read_pdu(&mut self.reader, self.max_pdu_length, self.strict).context(ReceivePduSnafu)
    }

    /// Obtain the next presentation data value,
    /// receiving more PDUs as needed.
    fn next_incoming(&mut self) -> Result<Incoming> {
        loop {
            if let Some(value) = self.pending.pop_front() {
                return Ok(Incoming::Value(value));
            }
            let pdu = match read_pdu(&mut self.reader, self.max_pdu_length, self.strict) {
                Ok(pdu) => pdu,
                Err(ReadError::NoPduAvailable) => return Ok(Incoming::Closed),
                Err(e) => return Err(e).context(ReceivePduSnafu),
            };
            match pdu {
                Pdu::PData { data } => self.pending.extend(data),
                Pdu::ReleaseRQ => return Ok(Incoming::ReleaseRequest),
                Pdu::AbortRQ { source } => return Ok(Incoming::Abort(source)),
                pdu => return Ok(Incoming::Other(pdu)),
            }
        }
    }

    /// Collect the fragments of one whole message.
    fn read_pdata(&mut self, value_type: PDataValueType) -> Result<(u8, Vec<u8>)> {
        let mut buffer = Vec::new();
        let mut context_id = None;
        loop {
            let value = match self.next_incoming()? {
                Incoming::Value(value) => value,
                Incoming::Abort(source) => {
                    warn!("Association aborted by peer ({:?})", source);
                    return AbortedSnafu.fail();
                }
                Incoming::Closed => return ConnectionClosedSnafu.fail(),
                Incoming::ReleaseRequest => {
                    return UnexpectedPduSnafu {
                        pdu: Box::new(Pdu::ReleaseRQ),
                    }
                    .fail()
                }
                Incoming::Other(pdu) => {
                    return UnexpectedPduSnafu { pdu: Box::new(pdu) }.fail();
                }
            };
            ensure!(
                value.value_type == value_type,
                UnexpectedValueTypeSnafu {
                    expected: value_type,
                    got: value.value_type
                }
            );
            let id = *context_id.get_or_insert(value.presentation_context_id);
            ensure!(
                id == value.presentation_context_id,
                MixedPresentationContextsSnafu {
                    expected: id,
                    got: value.presentation_context_id
                }
            );
            let mut data = value.data;
            buffer.append(&mut data);
            if value.is_last {
                return Ok((id, buffer));
            }
        }
    }
}

/// Encode and send a single PDU.
pub(crate) fn send_pdu<W>(writer: &mut W, pdu: &Pdu) -> Result<()>
where
    W: Write + ?Sized,
{
    let mut buffer = Vec::new();
    write_pdu(&mut buffer, pdu).context(SendPduSnafu)?;
    writer.write_all(&buffer).context(WireSendSnafu)?;
    writer.flush().context(WireSendSnafu)
}

/// Encode an object and send it as one message,
/// fragmented into P-DATA-TF PDUs.
pub(crate) fn send_message<W>(
    writer: &mut W,
    presentation_context_id: u8,
    value_type: PDataValueType,
    obj: &DicomObject,
    ts: &TransferSyntax,
    max_pdu_length: u32,
) -> Result<()>
where
    W: Write + ?Sized,
{
    let mut pdata = PDataWriter::new(
        &mut *writer,
        presentation_context_id,
        value_type,
        max_pdu_length,
    );
    VrWriter::new(&mut pdata, ts)
        .write_object(obj)
        .context(EncodeMessageSnafu)?;
    pdata.finish().context(WireSendSnafu)?;
    writer.flush().context(WireSendSnafu)
}

/// Send a command set in implicit VR little endian,
/// with its group length recomputed.
pub(crate) fn send_command<W>(
    writer: &mut W,
    presentation_context_id: u8,
    command: &DicomObject,
    max_pdu_length: u32,
) -> Result<()>
where
    W: Write + ?Sized,
{
    let command = dimse::with_group_length(command).context(InvalidCommandSnafu)?;
    send_message(
        writer,
        presentation_context_id,
        PDataValueType::Command,
        &command,
        &IMPLICIT_VR_LITTLE_ENDIAN,
        max_pdu_length,
    )
}

/// Socket settings shared by both ends of an association.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub(crate) struct SocketTimeouts {
    pub read: Option<Duration>,
    pub write: Option<Duration>,
}

impl SocketTimeouts {
    /// Apply the timeouts to the socket,
    /// returning a second handle to write with.
    pub fn prepare(&self, socket: &TcpStream) -> Result<TcpStream> {
        socket.set_read_timeout(self.read).context(SetReadTimeoutSnafu)?;
        socket.set_write_timeout(self.write).context(SetWriteTimeoutSnafu)?;
        socket.try_clone().context(CloneSocketSnafu)
    }
}

/// The parts of an association settled during establishment.
pub(crate) struct Negotiated {
    pub local_ae_title: String,
    pub peer_ae_title: String,
    pub presentation_contexts: Vec<PresentationContextNegotiated>,
    pub max_pdu_length: u32,
    pub peer_max_pdu_length: u32,
    pub strict: bool,
    pub peer_implementation_class_uid: Option<String>,
    pub peer_implementation_version_name: Option<String>,
    pub dict: Arc<dyn DataDictionary>,
    pub providers: Vec<Arc<dyn ServiceClassProvider>>,
}

/// An established DICOM association.
///
/// Obtained from [`ClientAssociationOptions::establish`]
/// or [`ServerAssociationOptions::establish`].
/// The association is not released on drop:
/// call [`release`](Self::release) or [`abort`](Self::abort)
/// to end it gracefully.
pub struct Association<R, W> {
    source: PduSource<R>,
    writer: W,
    local_ae_title: String,
    peer_ae_title: String,
    presentation_contexts: Vec<PresentationContextNegotiated>,
    /// the maximum length of PDUs sent to the peer
    peer_max_pdu_length: u32,
    peer_implementation_class_uid: Option<String>,
    peer_implementation_version_name: Option<String>,
    dict: Arc<dyn DataDictionary>,
    providers: Vec<Arc<dyn ServiceClassProvider>>,
}

impl<R, W> fmt::Debug for Association<R, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Association")
            .field("local_ae_title", &self.local_ae_title)
            .field("peer_ae_title", &self.peer_ae_title)
            .field("presentation_contexts", &self.presentation_contexts)
            .field("max_pdu_length", &self.source.max_pdu_length)
            .field("peer_max_pdu_length", &self.peer_max_pdu_length)
            .field("providers", &self.providers.len())
            .finish_non_exhaustive()
    }
}

impl<R, W> Association<R, W>
where
    R: Read,
    W: Write,
{
    pub(crate) fn new(reader: R, writer: W, negotiated: Negotiated) -> Self {
        // a maximum length of 0 means unlimited
        let peer_max_pdu_length = match negotiated.peer_max_pdu_length {
            0 => u32::MAX,
            len => len,
        };
        Association {
            source: PduSource {
                reader,
                pending: VecDeque::new(),
                max_pdu_length: negotiated.max_pdu_length,
                strict: negotiated.strict,
            },
            writer,
            local_ae_title: negotiated.local_ae_title,
            peer_ae_title: negotiated.peer_ae_title,
            presentation_contexts: negotiated.presentation_contexts,
            peer_max_pdu_length,
            peer_implementation_class_uid: negotiated.peer_implementation_class_uid,
            peer_implementation_version_name: negotiated.peer_implementation_version_name,
            dict: negotiated.dict,
            providers: negotiated.providers,
        }
    }

    /// All presentation contexts negotiated,
    /// whether accepted or not.
    pub fn presentation_contexts(&self) -> &[PresentationContextNegotiated] {
        &self.presentation_contexts
    }

    /// The accepted presentation context with the given ID.
    pub fn presentation_context(&self, id: u8) -> Option<&PresentationContextNegotiated> {
        self.presentation_contexts
            .iter()
            .find(|pc| pc.id == id && pc.is_accepted())
    }

    /// The first accepted presentation context
    /// for the given abstract syntax.
    pub fn context_for(&self, abstract_syntax: &str) -> Option<&PresentationContextNegotiated> {
        self.presentation_contexts
            .iter()
            .find(|pc| pc.is_accepted() && uid_eq(&pc.abstract_syntax, abstract_syntax))
    }

    /// The transfer syntax accepted for the given presentation context.
    pub fn transfer_syntax_of(&self, id: u8) -> Result<&'static TransferSyntax> {
        let pc = self
            .presentation_context(id)
            .context(NoSuchPresentationContextSnafu { id })?;
        transfer_syntax::get(&pc.transfer_syntax).context(UnsupportedTransferSyntaxSnafu {
            uid: pc.transfer_syntax.clone(),
        })
    }

    pub fn local_ae_title(&self) -> &str {
        &self.local_ae_title
    }

    pub fn peer_ae_title(&self) -> &str {
        &self.peer_ae_title
    }

    /// The maximum PDU length admitted by this node.
    pub fn max_pdu_length(&self) -> u32 {
        self.source.max_pdu_length
    }

    /// The maximum PDU length used when sending to the peer.
    pub fn peer_max_pdu_length(&self) -> u32 {
        self.peer_max_pdu_length
    }

    pub fn peer_implementation_class_uid(&self) -> Option<&str> {
        self.peer_implementation_class_uid.as_deref()
    }

    pub fn peer_implementation_version_name(&self) -> Option<&str> {
        self.peer_implementation_version_name.as_deref()
    }

    /// The data dictionary used to decode incoming messages.
    pub fn dictionary(&self) -> &dyn DataDictionary {
        &*self.dict
    }

    /// Send a PDU message to the peer.
    pub fn send(&mut self, pdu: &Pdu) -> Result<()> {
        send_pdu(&mut self.writer, pdu)
    }

    /// Read a PDU message from the peer.
    pub fn receive(&mut self) -> Result<Pdu> {
        self.source.receive()
    }

    /// Send a command set on the given presentation context.
    pub fn write_command(&mut self, presentation_context_id: u8, command: &DicomObject) -> Result<()> {
        ensure!(
            self.presentation_context(presentation_context_id).is_some(),
            NoSuchPresentationContextSnafu {
                id: presentation_context_id
            }
        );
        send_command(
            &mut self.writer,
            presentation_context_id,
            command,
            self.peer_max_pdu_length,
        )
    }

    /// Send a data set on the given presentation context,
    /// encoded in its accepted transfer syntax.
    pub fn write_message(&mut self, presentation_context_id: u8, data_set: &DicomObject) -> Result<()> {
        let ts = self.transfer_syntax_of(presentation_context_id)?;
        send_message(
            &mut self.writer,
            presentation_context_id,
            PDataValueType::Data,
            data_set,
            ts,
            self.peer_max_pdu_length,
        )
    }

    /// Receive the next command set,
    /// along with the presentation context it arrived on.
    pub fn read_command(&mut self) -> Result<(u8, DicomObject)> {
        let (id, bytes) = self.source.read_pdata(PDataValueType::Command)?;
        let command = read_object(&bytes, &IMPLICIT_VR_LITTLE_ENDIAN, &*self.dict)
            .context(DecodeMessageSnafu)?;
        Ok((id, command))
    }

    /// Receive the next data set as raw bytes,
    /// along with the presentation context it arrived on.
    pub fn read_message_bytes(&mut self) -> Result<(u8, Vec<u8>)> {
        self.source.read_pdata(PDataValueType::Data)
    }

    /// Receive and decode the next data set,
    /// along with the presentation context it arrived on.
    pub fn read_message(&mut self) -> Result<(u8, DicomObject)> {
        let (id, bytes) = self.read_message_bytes()?;
        let ts = self.transfer_syntax_of(id)?;
        let obj = read_object(&bytes, ts, &*self.dict).context(DecodeMessageSnafu)?;
        Ok((id, obj))
    }

    /// Gracefully terminate the association
    /// by exchanging release messages with the peer.
    pub fn release(mut self) -> Result<()> {
        self.send(&Pdu::ReleaseRQ)?;
        loop {
            match self.source.next_incoming()? {
                Incoming::Other(Pdu::ReleaseRP) => {
                    debug!("Association released");
                    return Ok(());
                }
                // release collision: answer and keep waiting for ours
                Incoming::ReleaseRequest => self.send(&Pdu::ReleaseRP)?,
                Incoming::Value(_) => {
                    warn!("Discarding presentation data received during release");
                }
                Incoming::Abort(_) => return AbortedSnafu.fail(),
                Incoming::Closed => return ConnectionClosedSnafu.fail(),
                Incoming::Other(pdu) => {
                    return UnexpectedPduSnafu { pdu: Box::new(pdu) }.fail();
                }
            }
        }
    }

    /// Abruptly terminate the association.
    pub fn abort(mut self) -> Result<()> {
        self.send(&Pdu::AbortRQ {
            source: AbortRQSource::ServiceUser,
        })
    }

    /// Send an A-ABORT on behalf of the service provider,
    /// ignoring failures.
    fn abort_quietly(&mut self, reason: AbortRQServiceProviderReason) {
        let pdu = Pdu::AbortRQ {
            source: AbortRQSource::ServiceProvider(reason),
        };
        if let Err(e) = send_pdu(&mut self.writer, &pdu) {
            debug!("Could not send A-ABORT: {}", snafu::Report::from_error(e));
        }
    }
}

impl TcpAssociation {
    /// The address of the peer node.
    pub fn peer_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.writer.peer_addr()
    }
}
