//! The accepting side of an association.
//!
//! [`ServerAssociationOptions`] holds the policy of an acceptor node
//! and the service class providers it offers.
//! One value serves any number of incoming connections.
use std::borrow::Cow;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use dcmlink_core::DataDictionary;
use dcmlink_dictionary_std::{uids, StandardDataDictionary};
use dcmlink_encoding::transfer_syntax;
use snafu::{ensure, ResultExt};
use tracing::{debug, warn};

use crate::pdu::{
    read_pdu, AbortRQServiceProviderReason, AbortRQSource, AssociationAC, AssociationRJ,
    AssociationRJResult, AssociationRJServiceProviderASCEReason, AssociationRJServiceUserReason,
    AssociationRJSource, AssociationRQ, Pdu, PresentationContextProposed,
    PresentationContextResult, PresentationContextResultReason, UserVariableItem,
    DEFAULT_MAX_PDU,
};

use super::{
    client::unexpected,
    peer::{abort_establishment, own_user_variables, PeerUserInfo},
    send_pdu,
    service::ServiceClassProvider,
    uid::{trim_uid, uid_eq},
    Association, MissingAbstractSyntaxSnafu, Negotiated, PresentationContextNegotiated,
    ReceivePduSnafu, RejectedSnafu, Result, SocketTimeouts, TcpAssociation,
};

/// Placed in the results of presentation contexts which were refused,
/// where the field carries no meaning.
const REJECTED_TRANSFER_SYNTAX: &str = uids::IMPLICIT_VR_LITTLE_ENDIAN;

/// A policy on which requesters may associate with this node.
pub trait AccessControl {
    /// Decide on a request given the AE title of this node
    /// and the two titles in the request.
    ///
    /// The error is the reason reported in the A-ASSOCIATE-RJ.
    fn check_access(
        &self,
        this_ae_title: &str,
        calling_ae_title: &str,
        called_ae_title: &str,
    ) -> Result<(), AssociationRJServiceUserReason>;
}

/// Lets every requester in.
#[derive(Debug, Default, Copy, Clone, Eq, Hash, PartialEq)]
pub struct AcceptAny;

impl AccessControl for AcceptAny {
    fn check_access(&self, _: &str, _: &str, _: &str) -> Result<(), AssociationRJServiceUserReason> {
        Ok(())
    }
}

/// Lets a requester in only if it called this node by its AE title.
#[derive(Debug, Default, Copy, Clone, Eq, Hash, PartialEq)]
pub struct AcceptCalledAeTitle;

impl AccessControl for AcceptCalledAeTitle {
    fn check_access(
        &self,
        this_ae_title: &str,
        _: &str,
        called_ae_title: &str,
    ) -> Result<(), AssociationRJServiceUserReason> {
        if this_ae_title == called_ae_title {
            Ok(())
        } else {
            Err(AssociationRJServiceUserReason::CalledAETitleNotRecognized)
        }
    }
}

/// Builder of associations accepted by this node,
/// usually acting as a service class provider.
///
/// A proposed presentation context is accepted
/// when some registered provider lists its abstract syntax
/// along with one of its transfer syntaxes.
/// Among those, the requester's first choice wins.
/// Contexts nobody can take are refused one by one
/// while the rest of the association goes ahead.
///
/// The whole request is turned down
/// for a protocol version other than 1,
/// an unknown application context,
/// or when the [`AccessControl`] policy says so.
/// The policy starts as [`AcceptAny`].
///
/// ```no_run
/// # use std::net::TcpListener;
/// # use std::sync::Arc;
/// # use dcmlink_ul::association::{ServerAssociationOptions, VerificationProvider};
/// # fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let options = ServerAssociationOptions::new()
///     .ae_title("ARCHIVE")
///     .accept_called_ae_title()
///     .with_provider(Arc::new(VerificationProvider));
///
/// let listener = TcpListener::bind("0.0.0.0:104")?;
/// for stream in listener.incoming() {
///     let mut association = options.establish(stream?)?;
///     association.serve()?;
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ServerAssociationOptions<'a, A> {
    access_control: A,
    ae_title: Cow<'a, str>,
    application_context_name: Cow<'a, str>,
    /// earlier registrations take precedence
    providers: Vec<Arc<dyn ServiceClassProvider>>,
    protocol_version: u16,
    max_pdu_length: u32,
    strict: bool,
    timeouts: SocketTimeouts,
    dict: Option<Arc<dyn DataDictionary>>,
}

impl Default for ServerAssociationOptions<'_, AcceptAny> {
    fn default() -> Self {
        ServerAssociationOptions {
            access_control: AcceptAny,
            ae_title: "THIS-SCP".into(),
            application_context_name: uids::DICOM_APPLICATION_CONTEXT.into(),
            providers: Vec::new(),
            protocol_version: 1,
            max_pdu_length: DEFAULT_MAX_PDU,
            strict: true,
            timeouts: SocketTimeouts::default(),
            dict: None,
        }
    }
}

impl ServerAssociationOptions<'_, AcceptAny> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<'a, A> ServerAssociationOptions<'a, A>
where
    A: AccessControl,
{
    /// Go back to letting every requester in.
    pub fn accept_any(self) -> ServerAssociationOptions<'a, AcceptAny> {
        self.ae_access_control(AcceptAny)
    }

    /// Only let in requesters which call this node by its AE title.
    pub fn accept_called_ae_title(self) -> ServerAssociationOptions<'a, AcceptCalledAeTitle> {
        self.ae_access_control(AcceptCalledAeTitle)
    }

    /// Replace the access control policy.
    pub fn ae_access_control<P>(self, access_control: P) -> ServerAssociationOptions<'a, P>
    where
        P: AccessControl,
    {
        ServerAssociationOptions {
            access_control,
            ae_title: self.ae_title,
            application_context_name: self.application_context_name,
            providers: self.providers,
            protocol_version: self.protocol_version,
            max_pdu_length: self.max_pdu_length,
            strict: self.strict,
            timeouts: self.timeouts,
            dict: self.dict,
        }
    }

    /// The AE title of this node (`THIS-SCP` unless set).
    pub fn ae_title<T>(mut self, ae_title: T) -> Self
    where
        T: Into<Cow<'a, str>>,
    {
        self.ae_title = ae_title.into();
        self
    }

    /// Offer the services of a provider.
    /// For an abstract syntax claimed by several providers,
    /// the first one registered is picked.
    pub fn with_provider(mut self, provider: Arc<dyn ServiceClassProvider>) -> Self {
        self.providers.push(provider);
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

    /// Answer an association request,
    /// with the A-ASSOCIATE-AC or the A-ASSOCIATE-RJ to send back.
    pub fn negotiate(&self, rq: &AssociationRQ) -> Result<AssociationAC, AssociationRJ> {
        self.admit(rq).map_err(|source| AssociationRJ {
            result: AssociationRJResult::Permanent,
            source,
        })?;

        let presentation_contexts: Vec<_> = rq
            .presentation_contexts
            .iter()
            .map(|pc| self.answer(pc))
            .collect();
        let roles = accepted_roles(rq, &presentation_contexts);

        Ok(AssociationAC {
            protocol_version: self.protocol_version,
            calling_ae_title: rq.calling_ae_title.clone(),
            called_ae_title: rq.called_ae_title.clone(),
            application_context_name: rq.application_context_name.clone(),
            presentation_contexts,
            user_variables: own_user_variables(self.max_pdu_length, roles),
        })
    }

    /// The checks which apply to the request as a whole.
    fn admit(&self, rq: &AssociationRQ) -> Result<(), AssociationRJSource> {
        if rq.protocol_version != self.protocol_version {
            return Err(AssociationRJSource::ServiceProviderASCE(
                AssociationRJServiceProviderASCEReason::ProtocolVersionNotSupported,
            ));
        }
        if trim_uid(&rq.application_context_name) != self.application_context_name {
            return Err(AssociationRJSource::ServiceUser(
                AssociationRJServiceUserReason::ApplicationContextNameNotSupported,
            ));
        }
        self.access_control
            .check_access(&self.ae_title, &rq.calling_ae_title, &rq.called_ae_title)
            .map_err(AssociationRJSource::ServiceUser)
    }

    /// The result for one proposed presentation context.
    fn answer(&self, pc: &PresentationContextProposed) -> PresentationContextResult {
        match self.choose_transfer_syntax(trim_uid(&pc.abstract_syntax), &pc.transfer_syntaxes) {
            Ok(transfer_syntax) => PresentationContextResult {
                id: pc.id,
                reason: PresentationContextResultReason::Acceptance,
                transfer_syntax,
            },
            Err(reason) => {
                warn!(
                    "Refusing presentation context {} for {}: {}",
                    pc.id, pc.abstract_syntax, reason
                );
                PresentationContextResult {
                    id: pc.id,
                    reason,
                    transfer_syntax: REJECTED_TRANSFER_SYNTAX.to_string(),
                }
            }
        }
    }

    fn choose_transfer_syntax(
        &self,
        abstract_syntax: &str,
        proposed: &[String],
    ) -> Result<String, PresentationContextResultReason> {
        let Some(provider) = self
            .providers
            .iter()
            .find(|p| p.sop_class_uids().iter().any(|uid| uid_eq(uid, abstract_syntax)))
        else {
            return Err(PresentationContextResultReason::AbstractSyntaxNotSupported);
        };

        let supported = |ts: &str| {
            transfer_syntax::get(ts).is_some()
                && provider.transfer_syntaxes().iter().any(|uid| uid_eq(uid, ts))
        };
        proposed
            .iter()
            .map(|ts| trim_uid(ts))
            .find(|ts| supported(*ts))
            .map(String::from)
            .ok_or(PresentationContextResultReason::TransferSyntaxesNotSupported)
    }

    /// Wait for an association request on a new TCP connection
    /// and answer it.
    pub fn establish(&self, socket: TcpStream) -> Result<TcpAssociation> {
        let writer = self.timeouts.prepare(&socket)?;
        self.establish_on(socket, writer)
    }

    /// Wait for an association request over a transport which is already open
    /// and answer it.
    pub fn establish_on<R, W>(&self, mut reader: R, mut writer: W) -> Result<Association<R, W>>
    where
        R: Read,
        W: Write,
    {
        ensure!(!self.providers.is_empty(), MissingAbstractSyntaxSnafu);

        let rq = match read_pdu(&mut reader, self.max_pdu_length, self.strict)
            .context(ReceivePduSnafu)?
        {
            Pdu::AssociationRQ(rq) => rq,
            pdu => {
                let reason = if matches!(pdu, Pdu::Unknown { .. }) {
                    AbortRQServiceProviderReason::UnrecognizedPdu
                } else {
                    AbortRQServiceProviderReason::UnexpectedPdu
                };
                abort_establishment(&mut writer, AbortRQSource::ServiceProvider(reason));
                return Err(unexpected(pdu));
            }
        };

        let ac = match self.negotiate(&rq) {
            Ok(ac) => ac,
            Err(association_rj) => {
                warn!(
                    "Rejecting association from {}: {}",
                    rq.calling_ae_title, association_rj.source
                );
                send_pdu(&mut writer, &Pdu::AssociationRJ(association_rj.clone()))?;
                return RejectedSnafu { association_rj }.fail();
            }
        };

        // results come back in the order of the proposals
        let presentation_contexts: Vec<_> = rq
            .presentation_contexts
            .iter()
            .zip(&ac.presentation_contexts)
            .map(|(proposed, result)| PresentationContextNegotiated {
                id: result.id,
                abstract_syntax: trim_uid(&proposed.abstract_syntax).to_string(),
                transfer_syntax: result.transfer_syntax.clone(),
                reason: result.reason,
            })
            .collect();
        send_pdu(&mut writer, &Pdu::AssociationAC(ac))?;

        let peer = PeerUserInfo::from_items(rq.user_variables);
        debug!(
            "Association with {} established, {} of {} presentation contexts accepted",
            rq.calling_ae_title,
            presentation_contexts.iter().filter(|pc| pc.is_accepted()).count(),
            presentation_contexts.len()
        );

        Ok(Association::new(
            reader,
            writer,
            Negotiated {
                local_ae_title: self.ae_title.to_string(),
                peer_ae_title: rq.calling_ae_title,
                presentation_contexts,
                max_pdu_length: self.max_pdu_length,
                peer_max_pdu_length: peer.send_limit(self.max_pdu_length),
                strict: self.strict,
                peer_implementation_class_uid: peer.implementation_class_uid,
                peer_implementation_version_name: peer.implementation_version_name,
                dict: self
                    .dict
                    .clone()
                    .unwrap_or_else(|| StandardDataDictionary::shared() as Arc<dyn DataDictionary>),
                providers: self.providers.clone(),
            },
        ))
    }
}

/// Role selection answers for the SOP classes
/// whose presentation contexts were accepted.
/// This node never takes the SCU role itself,
/// so only the requester's SCU proposal is echoed.
fn accepted_roles(rq: &AssociationRQ, results: &[PresentationContextResult]) -> Vec<UserVariableItem> {
    let is_accepted = |sop_class_uid: &str| {
        rq.presentation_contexts.iter().any(|pc| {
            uid_eq(&pc.abstract_syntax, sop_class_uid)
                && results.iter().any(|r| {
                    r.id == pc.id && r.reason == PresentationContextResultReason::Acceptance
                })
        })
    };

    rq.user_variables
        .iter()
        .filter_map(|item| match item {
            UserVariableItem::RoleSelection {
                sop_class_uid,
                scu_role,
                ..
            } if is_accepted(sop_class_uid) => Some(UserVariableItem::RoleSelection {
                sop_class_uid: sop_class_uid.clone(),
                scu_role: *scu_role,
                scp_role: false,
            }),
            _ => None,
        })
        .collect()
}
