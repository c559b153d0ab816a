//! Service class roles on top of an association.
//!
//! A [`ServiceClassUser`] tells the association requester
//! which presentation contexts to propose.
//! A [`ServiceClassProvider`] tells the acceptor
//! which abstract and transfer syntaxes it may accept,
//! and processes the commands which arrive on them
//! while the association is being [served](super::Association::serve).
use std::io::{self, Read, Write};
use std::sync::Arc;

use bytes::{Buf, Bytes};
use crossbeam_channel::Receiver;
use dcmlink_core::{DataDictionary, DicomObject};
use dcmlink_dictionary_std::uids;
use dcmlink_encoding::transfer_syntax::TransferSyntax;
use dcmlink_encoding::VrReader;
use snafu::{ensure, OptionExt, ResultExt};
use tracing::debug;

use super::{
    send_command, send_message, Association, InvalidCommandSnafu,
    NoPresentationContextForSnafu, Result, UnexpectedStatusSnafu,
};
use crate::dimse;
use crate::pdu::PDataValueType;

/// The error type returned by service class providers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The transfer syntaxes which every implementation supports.
pub const DEFAULT_TRANSFER_SYNTAXES: &[&str] = &[
    uids::EXPLICIT_VR_LITTLE_ENDIAN,
    uids::IMPLICIT_VR_LITTLE_ENDIAN,
];

/// A service class user,
/// contributing presentation contexts to an association request.
pub trait ServiceClassUser {
    /// The abstract syntaxes to propose,
    /// one presentation context each.
    fn sop_class_uids(&self) -> &[&str];

    /// The transfer syntaxes to propose for each presentation context,
    /// in order of preference.
    fn transfer_syntaxes(&self) -> &[&str] {
        DEFAULT_TRANSFER_SYNTAXES
    }
}

/// A service class provider,
/// serving the commands issued on the presentation contexts
/// of the abstract syntaxes it supports.
pub trait ServiceClassProvider: std::fmt::Debug + Send + Sync {
    /// The abstract syntaxes which this provider may accept.
    fn sop_class_uids(&self) -> &[&str];

    /// The transfer syntaxes which this provider may accept.
    fn transfer_syntaxes(&self) -> &[&str] {
        DEFAULT_TRANSFER_SYNTAXES
    }

    /// Process one command.
    ///
    /// `data_set` is present if the command announced a data set,
    /// and streams its bytes while they arrive from the peer.
    /// Responses are sent through the `context`.
    ///
    /// Returning an error aborts the association.
    fn process_command(
        &self,
        context: &mut CommandContext<'_>,
        command: &DicomObject,
        data_set: Option<DataSetReader>,
    ) -> Result<(), HandlerError>;
}

/// The means for a service class provider
/// to reply to the command it is processing.
pub struct CommandContext<'a> {
    pub(crate) writer: &'a mut (dyn Write + Send),
    pub(crate) presentation_context_id: u8,
    pub(crate) transfer_syntax: &'static TransferSyntax,
    pub(crate) max_pdu_length: u32,
    pub(crate) dict: &'a dyn DataDictionary,
}

impl std::fmt::Debug for CommandContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandContext")
            .field("presentation_context_id", &self.presentation_context_id)
            .field("transfer_syntax", &self.transfer_syntax.uid())
            .field("max_pdu_length", &self.max_pdu_length)
            .finish_non_exhaustive()
    }
}

impl CommandContext<'_> {
    /// The presentation context on which the command arrived.
    pub fn presentation_context_id(&self) -> u8 {
        self.presentation_context_id
    }

    /// The transfer syntax accepted for the presentation context.
    pub fn transfer_syntax(&self) -> &'static TransferSyntax {
        self.transfer_syntax
    }

    pub fn dictionary(&self) -> &dyn DataDictionary {
        self.dict
    }

    /// Send a command set to the peer.
    pub fn write_command(&mut self, command: &DicomObject) -> super::Result<()> {
        send_command(
            &mut *self.writer,
            self.presentation_context_id,
            command,
            self.max_pdu_length,
        )
    }

    /// Send a data set to the peer,
    /// encoded in the accepted transfer syntax.
    pub fn write_message(&mut self, data_set: &DicomObject) -> super::Result<()> {
        send_message(
            &mut *self.writer,
            self.presentation_context_id,
            PDataValueType::Data,
            data_set,
            self.transfer_syntax,
            self.max_pdu_length,
        )
    }
}

/// A piece of a data set message in transit.
#[derive(Debug)]
pub(crate) enum Fragment {
    Data(Bytes),
    End,
}

/// A reader of the data set which follows a command,
/// streamed while it is received.
///
/// If the association ends before the whole data set arrives,
/// reading fails with [`ConnectionAborted`](io::ErrorKind::ConnectionAborted).
#[derive(Debug)]
pub struct DataSetReader {
    fragments: Receiver<Fragment>,
    current: Bytes,
    finished: bool,
    transfer_syntax: &'static TransferSyntax,
    dict: Arc<dyn DataDictionary>,
}

impl DataSetReader {
    pub(crate) fn new(
        fragments: Receiver<Fragment>,
        transfer_syntax: &'static TransferSyntax,
        dict: Arc<dyn DataDictionary>,
    ) -> Self {
        DataSetReader {
            fragments,
            current: Bytes::new(),
            finished: false,
            transfer_syntax,
            dict,
        }
    }

    /// The transfer syntax in which the data set is encoded.
    pub fn transfer_syntax(&self) -> &'static TransferSyntax {
        self.transfer_syntax
    }

    /// Decode the whole data set.
    pub fn read_object(&mut self) -> Result<DicomObject, dcmlink_encoding::decode::Error> {
        let ts = self.transfer_syntax;
        let dict = Arc::clone(&self.dict);
        VrReader::new(self, ts, &*dict).read_object()
    }
}

impl Read for DataSetReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while !self.current.has_remaining() {
            if self.finished {
                return Ok(0);
            }
            match self.fragments.recv() {
                Ok(Fragment::Data(bytes)) => self.current = bytes,
                Ok(Fragment::End) => self.finished = true,
                Err(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::ConnectionAborted,
                        "data set transfer was interrupted",
                    ))
                }
            }
        }
        let n = buf.len().min(self.current.remaining());
        self.current.copy_to_slice(&mut buf[..n]);
        Ok(n)
    }
}

/// The verification service class provider,
/// answering C-ECHO requests with success.
#[derive(Debug, Default, Copy, Clone)]
pub struct VerificationProvider;

impl ServiceClassProvider for VerificationProvider {
    fn sop_class_uids(&self) -> &[&str] {
        &[uids::VERIFICATION]
    }

    fn process_command(
        &self,
        context: &mut CommandContext<'_>,
        command: &DicomObject,
        _data_set: Option<DataSetReader>,
    ) -> Result<(), HandlerError> {
        let field = dimse::command_field(command)?;
        if field != dimse::C_ECHO_RQ {
            return Err(format!("unsupported command field {:#06x}", field).into());
        }
        let message_id = dimse::message_id(command)?;
        debug!("Received C-ECHO-RQ #{}", message_id);
        context.write_command(&dimse::c_echo_rsp(message_id, dimse::STATUS_SUCCESS))?;
        Ok(())
    }
}

/// The verification service class user.
#[derive(Debug, Default, Copy, Clone)]
pub struct VerificationUser;

impl ServiceClassUser for VerificationUser {
    fn sop_class_uids(&self) -> &[&str] {
        &[uids::VERIFICATION]
    }
}

impl VerificationUser {
    /// Issue a C-ECHO request and wait for its response.
    ///
    /// Returns the status of the response,
    /// failing if it is not success.
    pub fn echo<R, W>(&self, association: &mut Association<R, W>, message_id: u16) -> Result<u16>
    where
        R: Read,
        W: Write,
    {
        let id = association
            .context_for(uids::VERIFICATION)
            .context(NoPresentationContextForSnafu {
                abstract_syntax: uids::VERIFICATION,
            })?
            .id;
        association.write_command(id, &dimse::c_echo_rq(message_id))?;
        let (_, rsp) = association.read_command()?;
        let status = dimse::status(&rsp).context(InvalidCommandSnafu)?;
        debug!(
            "C-ECHO-RSP for #{} with status {:#06x}",
            dimse::message_id_responded_to(&rsp).unwrap_or(message_id),
            status
        );
        ensure!(
            dimse::StatusType::of(status) == dimse::StatusType::Success,
            UnexpectedStatusSnafu { status }
        );
        Ok(status)
    }
}
