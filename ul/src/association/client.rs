//! The requesting side of an association.
//!
//! [`ClientAssociationOptions`] gathers what this node proposes,
//! then connects to the acceptor and negotiates with it.
use std::borrow::Cow;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use dcmlink_core::DataDictionary;
use dcmlink_dictionary_std::{uids, StandardDataDictionary};
use snafu::{ensure, ResultExt};
use tracing::{debug, warn};

use crate::pdu::{
    read_pdu, AbortRQSource, AssociationAC, AssociationRQ, Pdu, PresentationContextProposed,
    UserVariableItem, DEFAULT_MAX_PDU, MAXIMUM_PDU_SIZE,
};

use super::{
    peer::{abort_establishment, own_user_variables, PeerUserInfo},
    send_pdu,
    service::ServiceClassUser,
    uid::{trim_uid, trim_uid_cow},
    Association, ConnectSnafu, Error, MissingAbstractSyntaxSnafu, Negotiated,
    NoAcceptedPresentationContextsSnafu, PresentationContextNegotiated,
    ProtocolVersionMismatchSnafu, ReceivePduSnafu, RejectedSnafu, Result, SocketTimeouts,
    TcpAssociation, TooManyPresentationContextsSnafu, UnexpectedPduSnafu, UnknownPduSnafu,
};

/// Odd identifiers from 1 to 255 leave room for this many contexts.
const MAX_PRESENTATION_CONTEXTS: usize = 128;

/// One abstract syntax to propose, with its transfer syntaxes.
#[derive(Debug, Clone)]
struct Proposal<'a> {
    abstract_syntax: Cow<'a, str>,
    transfer_syntaxes: Vec<Cow<'a, str>>,
}

/// Builder of associations requested by this node,
/// usually acting as a service class user.
///
/// Proposals are added with
/// [`with_presentation_context`](Self::with_presentation_context),
/// [`with_abstract_syntax`](Self::with_abstract_syntax)
/// (which offers explicit and implicit VR little endian)
/// or [`with_service_user`](Self::with_service_user).
/// They receive the identifiers 1, 3, 5... in the order added.
/// Establishing fails if nothing was proposed.
///
/// ```no_run
/// # use dcmlink_ul::association::{ClientAssociationOptions, VerificationUser};
/// # fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let mut association = ClientAssociationOptions::new()
///     .calling_ae_title("WORKSTATION")
///     .called_ae_title("ARCHIVE")
///     .with_service_user(&VerificationUser)
///     .establish("10.0.0.8:104")?;
/// VerificationUser.echo(&mut association, 1)?;
/// association.release()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ClientAssociationOptions<'a> {
    calling_ae_title: Cow<'a, str>,
    called_ae_title: Cow<'a, str>,
    application_context_name: Cow<'a, str>,
    proposals: Vec<Proposal<'a>>,
    protocol_version: u16,
    /// largest PDU this node accepts to receive
    max_pdu_length: u32,
    strict: bool,
    timeouts: SocketTimeouts,
    dict: Option<Arc<dyn DataDictionary>>,
}

impl Default for ClientAssociationOptions<'_> {
    fn default() -> Self {
        ClientAssociationOptions {
            calling_ae_title: "THIS-SCU".into(),
            called_ae_title: "ANY-SCP".into(),
            application_context_name: uids::DICOM_APPLICATION_CONTEXT.into(),
            proposals: Vec::new(),
            protocol_version: 1,
            max_pdu_length: DEFAULT_MAX_PDU,
            strict: true,
            timeouts: SocketTimeouts::default(),
            dict: None,
        }
    }
}

impl<'a> ClientAssociationOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The AE title of this node (`THIS-SCU` unless set).
    pub fn calling_ae_title<T>(mut self, title: T) -> Self
    where
        T: Into<Cow<'a, str>>,
    {
        self.calling_ae_title = title.into();
        self
    }

    /// The AE title expected of the acceptor (`ANY-SCP` unless set).
    pub fn called_ae_title<T>(mut self, title: T) -> Self
    where
        T: Into<Cow<'a, str>>,
    {
        self.called_ae_title = title.into();
        self
    }

    /// Propose an abstract syntax with transfer syntaxes
    /// in order of preference.
    pub fn with_presentation_context<T>(mut self, abstract_syntax: T, transfer_syntaxes: Vec<T>) -> Self
    where
        T: Into<Cow<'a, str>>,
    {
        self.proposals.push(Proposal {
            abstract_syntax: trim_uid_cow(abstract_syntax.into()),
            transfer_syntaxes: transfer_syntaxes
                .into_iter()
                .map(|ts| trim_uid_cow(ts.into()))
                .collect(),
        });
        self
    }

    /// Propose an abstract syntax
    /// in explicit or implicit VR little endian.
    pub fn with_abstract_syntax<T>(self, abstract_syntax: T) -> Self
    where
        T: Into<Cow<'a, str>>,
    {
        self.with_presentation_context(
            abstract_syntax.into(),
            vec![
                Cow::Borrowed(uids::EXPLICIT_VR_LITTLE_ENDIAN),
                Cow::Borrowed(uids::IMPLICIT_VR_LITTLE_ENDIAN),
            ],
        )
    }

    /// Propose every SOP class of a service class user,
    /// each with the transfer syntaxes that user handles.
    pub fn with_service_user<U>(mut self, user: &U) -> Self
    where
        U: ServiceClassUser + ?Sized,
    {
        let transfer_syntaxes: Vec<Cow<'a, str>> = user
            .transfer_syntaxes()
            .iter()
            .map(|ts| Cow::Owned(trim_uid(ts).to_owned()))
            .collect();
        self.proposals
            .extend(user.sop_class_uids().iter().map(|uid| Proposal {
                abstract_syntax: Cow::Owned(trim_uid(uid).to_owned()),
                transfer_syntaxes: transfer_syntaxes.clone(),
            }));
        self
    }

    /// Announce a different maximum length for PDUs received.
    pub fn max_pdu_length(mut self, value: u32) -> Self {
        self.max_pdu_length = value;
        self
    }

    /// Whether a received PDU longer than announced
    /// is an error (the default) or tolerated.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.read = Some(timeout);
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.write = Some(timeout);
        self
    }

    /// Decode incoming messages with this dictionary
    /// rather than the standard one.
    pub fn dictionary(mut self, dict: Arc<dyn DataDictionary>) -> Self {
        self.dict = Some(dict);
        self
    }

    /// Connect over TCP and negotiate the association.
    pub fn establish<A: ToSocketAddrs>(self, address: A) -> Result<TcpAssociation> {
        let socket = TcpStream::connect(address).context(ConnectSnafu)?;
        let writer = self.timeouts.prepare(&socket)?;
        self.establish_on(socket, writer)
    }

    /// Negotiate the association over a transport which is already open.
    pub fn establish_on<R, W>(self, mut reader: R, mut writer: W) -> Result<Association<R, W>>
    where
        R: Read,
        W: Write,
    {
        let rq = self.request()?;
        let proposed = rq.presentation_contexts.clone();
        send_pdu(&mut writer, &Pdu::AssociationRQ(rq))?;

        let ac = match read_pdu(&mut reader, MAXIMUM_PDU_SIZE, self.strict)
            .context(ReceivePduSnafu)?
        {
            Pdu::AssociationAC(ac) => ac,
            Pdu::AssociationRJ(association_rj) => return RejectedSnafu { association_rj }.fail(),
            pdu => {
                abort_establishment(&mut writer, AbortRQSource::ServiceUser);
                return Err(unexpected(pdu));
            }
        };

        match self.conclude(ac, &proposed) {
            Ok(negotiated) => Ok(Association::new(reader, writer, negotiated)),
            Err(e) => {
                abort_establishment(&mut writer, AbortRQSource::ServiceUser);
                Err(e)
            }
        }
    }

    /// Build the A-ASSOCIATE-RQ for the proposals made so far.
    fn request(&self) -> Result<AssociationRQ> {
        ensure!(!self.proposals.is_empty(), MissingAbstractSyntaxSnafu);
        ensure!(
            self.proposals.len() <= MAX_PRESENTATION_CONTEXTS,
            TooManyPresentationContextsSnafu {
                count: self.proposals.len()
            }
        );

        let presentation_contexts: Vec<_> = self
            .proposals
            .iter()
            .enumerate()
            .map(|(i, proposal)| PresentationContextProposed {
                id: (i * 2 + 1) as u8,
                abstract_syntax: proposal.abstract_syntax.to_string(),
                transfer_syntaxes: proposal
                    .transfer_syntaxes
                    .iter()
                    .map(|ts| ts.to_string())
                    .collect(),
            })
            .collect();

        // this node only ever asks for the SCU role, once per SOP class
        let mut roles: Vec<UserVariableItem> = Vec::new();
        for pc in &presentation_contexts {
            let seen = roles.iter().any(|item| {
                matches!(item, UserVariableItem::RoleSelection { sop_class_uid, .. } if *sop_class_uid == pc.abstract_syntax)
            });
            if !seen {
                roles.push(UserVariableItem::RoleSelection {
                    sop_class_uid: pc.abstract_syntax.clone(),
                    scu_role: true,
                    scp_role: false,
                });
            }
        }

        Ok(AssociationRQ {
            protocol_version: self.protocol_version,
            calling_ae_title: self.calling_ae_title.to_string(),
            called_ae_title: self.called_ae_title.to_string(),
            application_context_name: self.application_context_name.to_string(),
            presentation_contexts,
            user_variables: own_user_variables(self.max_pdu_length, roles),
        })
    }

    /// Turn the acceptor's answer into the state of the new association.
    fn conclude(
        &self,
        ac: AssociationAC,
        proposed: &[PresentationContextProposed],
    ) -> Result<Negotiated> {
        ensure!(
            ac.protocol_version == self.protocol_version,
            ProtocolVersionMismatchSnafu {
                expected: self.protocol_version,
                got: ac.protocol_version,
            }
        );

        let mut presentation_contexts = Vec::with_capacity(ac.presentation_contexts.len());
        for result in &ac.presentation_contexts {
            let Some(pc) = proposed.iter().find(|pc| pc.id == result.id) else {
                warn!("Ignoring result for unknown presentation context {}", result.id);
                continue;
            };
            let negotiated = PresentationContextNegotiated {
                id: result.id,
                abstract_syntax: pc.abstract_syntax.clone(),
                transfer_syntax: trim_uid(&result.transfer_syntax).to_string(),
                reason: result.reason,
            };
            if negotiated.is_accepted() {
                debug!(
                    "Presentation context {} accepted: {} in {}",
                    negotiated.id, negotiated.abstract_syntax, negotiated.transfer_syntax
                );
            } else {
                warn!(
                    "Presentation context {} for {} rejected: {}",
                    negotiated.id, negotiated.abstract_syntax, negotiated.reason
                );
            }
            presentation_contexts.push(negotiated);
        }
        ensure!(
            presentation_contexts.iter().any(|pc| pc.is_accepted()),
            NoAcceptedPresentationContextsSnafu
        );

        let peer = PeerUserInfo::from_items(ac.user_variables);
        let peer_max_pdu_length = peer.send_limit(self.max_pdu_length);
        debug!(
            "Association with {} established, sending PDUs of up to {} bytes",
            self.called_ae_title, peer_max_pdu_length
        );

        Ok(Negotiated {
            local_ae_title: self.calling_ae_title.to_string(),
            peer_ae_title: self.called_ae_title.to_string(),
            presentation_contexts,
            max_pdu_length: self.max_pdu_length,
            peer_max_pdu_length,
            strict: self.strict,
            peer_implementation_class_uid: peer.implementation_class_uid,
            peer_implementation_version_name: peer.implementation_version_name,
            dict: self
                .dict
                .clone()
                .unwrap_or_else(|| StandardDataDictionary::shared() as Arc<dyn DataDictionary>),
            providers: Vec::new(),
        })
    }
}

/// The error for a PDU which has no place in association establishment.
pub(crate) fn unexpected(pdu: Pdu) -> Error {
    match pdu {
        pdu @ Pdu::Unknown { .. } => UnknownPduSnafu { pdu: Box::new(pdu) }.build(),
        pdu => UnexpectedPduSnafu { pdu: Box::new(pdu) }.build(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matches::assert_matches;

    #[test]
    fn request_numbers_contexts_and_selects_roles_once() {
        let rq = ClientAssociationOptions::new()
            .with_abstract_syntax(uids::VERIFICATION)
            .with_presentation_context(uids::CT_IMAGE_STORAGE, vec![uids::IMPLICIT_VR_LITTLE_ENDIAN])
            .with_abstract_syntax(uids::VERIFICATION)
            .request()
            .unwrap();

        let ids: Vec<_> = rq.presentation_contexts.iter().map(|pc| pc.id).collect();
        assert_eq!(ids, vec![1, 3, 5]);
        let roles = rq
            .user_variables
            .iter()
            .filter(|item| matches!(item, UserVariableItem::RoleSelection { .. }))
            .count();
        assert_eq!(roles, 2);
        assert_eq!(rq.user_variables[0], UserVariableItem::MaxLength(DEFAULT_MAX_PDU));
    }

    #[test]
    fn request_needs_a_proposal() {
        assert_matches!(
            ClientAssociationOptions::new().request(),
            Err(Error::MissingAbstractSyntax)
        );
    }

    #[test]
    fn request_refuses_too_many_contexts() {
        let options = (0..=MAX_PRESENTATION_CONTEXTS).fold(ClientAssociationOptions::new(), |o, _| {
            o.with_abstract_syntax(uids::VERIFICATION)
        });
        assert_matches!(
            options.request(),
            Err(Error::TooManyPresentationContexts { count: 129 })
        );
    }
}
