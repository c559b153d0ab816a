//! Serving an association with service class providers.
//!
//! Each command is processed by its provider on a scoped thread of its own
//! while the association keeps receiving from the peer,
//! so that a data set can be consumed as it arrives
//! instead of being collected in memory first.
//! The data set fragments travel through a bounded channel,
//! which holds back the receiving loop
//! when the provider falls behind.
use std::io::{Read, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use bytes::Bytes;
use crossbeam_channel::{bounded, Sender};
use dcmlink_encoding::read_object;
use dcmlink_encoding::transfer_syntax::IMPLICIT_VR_LITTLE_ENDIAN;
use snafu::{ensure, OptionExt, ResultExt};
use tracing::{debug, info, warn};

use super::service::{CommandContext, DataSetReader, Fragment};
use super::uid::uid_eq;
use super::{
    Association, ConnectionClosedSnafu, DecodeMessageSnafu, Error, HandlerPanickedSnafu,
    HandlerSnafu, Incoming, InvalidCommandSnafu, MixedPresentationContextsSnafu,
    NoProviderSnafu, PduSource, Result, UnexpectedPduSnafu, UnexpectedValueTypeSnafu,
};
use crate::dimse;
use crate::pdu::{AbortRQServiceProviderReason, PDataValueType, Pdu};

/// How many data set fragments may wait for the provider.
const FRAGMENT_QUEUE_CAPACITY: usize = 16;

/// Whether to keep serving after a message exchange.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

impl<R, W> Association<R, W>
where
    R: Read,
    W: Write + Send,
{
    /// Serve the association until it is released or aborted.
    ///
    /// Each incoming command is handed to the first registered provider
    /// supporting the abstract syntax of its presentation context.
    /// A release request is answered and ends the loop with success,
    /// as does an abort from the peer or the peer closing the connection.
    ///
    /// Protocol violations and provider failures
    /// abort the association and are returned as errors.
    pub fn serve(&mut self) -> Result<()> {
        let outcome = self.serve_commands();
        if let Err(e) = &outcome {
            let reason = match e {
                Error::UnexpectedPdu { .. } | Error::UnexpectedValueType { .. } => {
                    AbortRQServiceProviderReason::UnexpectedPdu
                }
                Error::ReceivePdu { .. } => AbortRQServiceProviderReason::InvalidPduParameter,
                _ => AbortRQServiceProviderReason::ReasonNotSpecified,
            };
            warn!("Aborting association: {}", snafu::Report::from_error(e));
            self.abort_quietly(reason);
        }
        outcome
    }

    fn serve_commands(&mut self) -> Result<()> {
        let mut command = Vec::new();
        let mut command_context_id = None;
        loop {
            match self.source.next_incoming()? {
                Incoming::Value(value) => {
                    ensure!(
                        value.value_type == PDataValueType::Command,
                        UnexpectedValueTypeSnafu {
                            expected: PDataValueType::Command,
                            got: value.value_type
                        }
                    );
                    let expected =
                        *command_context_id.get_or_insert(value.presentation_context_id);
                    ensure!(
                        value.presentation_context_id == expected,
                        MixedPresentationContextsSnafu {
                            expected,
                            got: value.presentation_context_id
                        }
                    );
                    let mut data = value.data;
                    command.append(&mut data);
                    if value.is_last {
                        let bytes = std::mem::take(&mut command);
                        command_context_id = None;
                        if self.dispatch(expected, &bytes)? == Flow::Stop {
                            return Ok(());
                        }
                    }
                }
                Incoming::ReleaseRequest => {
                    self.send(&Pdu::ReleaseRP)?;
                    info!("Association with {} released", self.peer_ae_title);
                    return Ok(());
                }
                Incoming::Abort(source) => {
                    info!("Association with {} aborted ({:?})", self.peer_ae_title, source);
                    return Ok(());
                }
                Incoming::Closed => {
                    debug!("Peer closed the connection");
                    return Ok(());
                }
                Incoming::Other(pdu) => {
                    return UnexpectedPduSnafu { pdu: Box::new(pdu) }.fail();
                }
            }
        }
    }

    /// Process one whole command with its provider,
    /// feeding it the data set which follows, if any.
    fn dispatch(&mut self, presentation_context_id: u8, bytes: &[u8]) -> Result<Flow> {
        let command = read_object(bytes, &IMPLICIT_VR_LITTLE_ENDIAN, &*self.dict)
            .context(DecodeMessageSnafu)?;
        let ts = self.transfer_syntax_of(presentation_context_id)?;
        let abstract_syntax = self
            .presentation_context(presentation_context_id)
            .map(|pc| pc.abstract_syntax.clone())
            .unwrap_or_default();
        let provider = self
            .providers
            .iter()
            .find(|p| {
                p.sop_class_uids()
                    .iter()
                    .any(|uid| uid_eq(uid, &abstract_syntax))
            })
            .cloned()
            .context(NoProviderSnafu {
                abstract_syntax: abstract_syntax.clone(),
            })?;
        let has_data_set = dimse::has_data_set(&command).context(InvalidCommandSnafu)?;
        debug!(
            "Command {:#06x} on presentation context {} ({}), data set: {}",
            dimse::command_field(&command).unwrap_or_default(),
            presentation_context_id,
            abstract_syntax,
            has_data_set
        );

        let Association {
            source,
            writer,
            dict,
            peer_max_pdu_length,
            ..
        } = self;
        let mut handled = None;
        let mut fed = Ok(Flow::Continue);

        std::thread::scope(|scope| {
            let (sender, data_set) = if has_data_set {
                let (sender, receiver) = bounded(FRAGMENT_QUEUE_CAPACITY);
                let reader = DataSetReader::new(receiver, ts, Arc::clone(dict));
                (Some(sender), Some(reader))
            } else {
                (None, None)
            };
            let mut context = CommandContext {
                writer: &mut *writer,
                presentation_context_id,
                transfer_syntax: ts,
                max_pdu_length: *peer_max_pdu_length,
                dict: &**dict,
            };
            let handled = &mut handled;
            let command = &command;
            let provider = &*provider;
            scope.spawn(move || {
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    provider.process_command(&mut context, command, data_set)
                }));
                *handled = Some(outcome);
            });

            if let Some(sender) = sender {
                fed = feed_data_set(source, presentation_context_id, sender);
            }
        });

        if fed? == Flow::Stop {
            // the provider's failure to read the rest is expected
            return Ok(Flow::Stop);
        }
        match handled {
            Some(Ok(outcome)) => outcome.context(HandlerSnafu)?,
            _ => return HandlerPanickedSnafu.fail(),
        }
        Ok(Flow::Continue)
    }
}

/// Pass the fragments of a data set message on to the provider.
///
/// The whole message is consumed
/// even if the provider stops reading early.
/// If the peer aborts midway, the sender is dropped
/// without signalling the end of the data set.
fn feed_data_set<R>(
    source: &mut PduSource<R>,
    presentation_context_id: u8,
    sender: Sender<Fragment>,
) -> Result<Flow>
where
    R: Read,
{
    loop {
        match source.next_incoming()? {
            Incoming::Value(value) => {
                ensure!(
                    value.value_type == PDataValueType::Data,
                    UnexpectedValueTypeSnafu {
                        expected: PDataValueType::Data,
                        got: value.value_type
                    }
                );
                ensure!(
                    value.presentation_context_id == presentation_context_id,
                    MixedPresentationContextsSnafu {
                        expected: presentation_context_id,
                        got: value.presentation_context_id
                    }
                );
                let is_last = value.is_last;
                // a provider which hung up no longer needs the data
                let _ = sender.send(Fragment::Data(Bytes::from(value.data)));
                if is_last {
                    let _ = sender.send(Fragment::End);
                    return Ok(Flow::Continue);
                }
            }
            Incoming::Abort(abort_source) => {
                info!("Association aborted while receiving data set ({:?})", abort_source);
                return Ok(Flow::Stop);
            }
            Incoming::Closed => return ConnectionClosedSnafu.fail(),
            Incoming::ReleaseRequest => {
                return UnexpectedPduSnafu {
                    pdu: Box::new(Pdu::ReleaseRQ),
                }
                .fail();
            }
            Incoming::Other(pdu) => {
                return UnexpectedPduSnafu { pdu: Box::new(pdu) }.fail();
            }
        }
    }
}
