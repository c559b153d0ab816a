use std::io::Read;
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use dcmlink_core::{DicomObject, VrElement, VR};
use dcmlink_dictionary_std::{tags, uids};
use dcmlink_encoding::transfer_syntax::EXPLICIT_VR_LITTLE_ENDIAN;
use dcmlink_ul::association::{
    CommandContext, DataSetReader, Error, HandlerError, ServerAssociationOptions,
    ServiceClassProvider, ServiceClassUser, VerificationProvider, VerificationUser,
};
use dcmlink_ul::dimse;
use dcmlink_ul::pdu::{AssociationRJServiceUserReason, AssociationRJSource};
use dcmlink_ul::ClientAssociationOptions;
use matches::assert_matches;

type Result<T, E = Box<dyn std::error::Error>> = std::result::Result<T, E>;

static SCU_AE_TITLE: &str = "ECHO-SCU";
static SCP_AE_TITLE: &str = "ECHO-SCP";

/// A storage provider decoding what it receives.
#[derive(Debug, Default)]
struct CollectingStorage {
    objects: Mutex<Vec<DicomObject>>,
}

impl ServiceClassProvider for CollectingStorage {
    fn sop_class_uids(&self) -> &[&str] {
        &[uids::SECONDARY_CAPTURE_IMAGE_STORAGE]
    }

    fn process_command(
        &self,
        context: &mut CommandContext<'_>,
        command: &DicomObject,
        data_set: Option<DataSetReader>,
    ) -> std::result::Result<(), HandlerError> {
        let message_id = dimse::message_id(command)?;
        let sop_instance_uid = dimse::affected_sop_instance_uid(command)?;
        let obj = data_set.ok_or("missing data set")?.read_object()?;
        self.objects.lock().unwrap().push(obj);
        context.write_command(&dimse::c_store_rsp(
            message_id,
            uids::SECONDARY_CAPTURE_IMAGE_STORAGE,
            &sop_instance_uid,
            dimse::STATUS_SUCCESS,
        ))?;
        Ok(())
    }
}

struct StorageUser;

impl ServiceClassUser for StorageUser {
    fn sop_class_uids(&self) -> &[&str] {
        &[uids::SECONDARY_CAPTURE_IMAGE_STORAGE]
    }
}

fn spawn_scp(
    options: ServerAssociationOptions<'static, impl dcmlink_ul::association::AccessControl + Send + 'static>,
) -> Result<(JoinHandle<Result<(), Error>>, SocketAddr)> {
    let listener = TcpListener::bind("localhost:0")?;
    let addr = listener.local_addr()?;
    let h = std::thread::spawn(move || -> Result<(), Error> {
        let (stream, _addr) = listener.accept().map_err(|source| Error::Connect { source })?;
        let mut association = options.establish(stream)?;
        association.serve()
    });
    Ok((h, addr))
}

#[test]
fn scu_scp_echo() {
    let options = ServerAssociationOptions::new()
        .accept_called_ae_title()
        .ae_title(SCP_AE_TITLE)
        .with_provider(Arc::new(VerificationProvider));
    let (scp, addr) = spawn_scp(options).unwrap();

    let mut association = ClientAssociationOptions::new()
        .calling_ae_title(SCU_AE_TITLE)
        .called_ae_title(SCP_AE_TITLE)
        .with_service_user(&VerificationUser)
        .establish(addr)
        .unwrap();

    assert_eq!(association.presentation_contexts().len(), 1);
    let pc = association.context_for(uids::VERIFICATION).unwrap();
    assert_eq!(pc.id, 1);
    assert_eq!(pc.transfer_syntax, uids::EXPLICIT_VR_LITTLE_ENDIAN);
    assert_eq!(
        association.peer_implementation_version_name(),
        Some(dcmlink_ul::IMPLEMENTATION_VERSION_NAME)
    );

    let status = VerificationUser.echo(&mut association, 1).unwrap();
    assert_eq!(status, dimse::STATUS_SUCCESS);
    let status = VerificationUser.echo(&mut association, 2).unwrap();
    assert_eq!(status, dimse::STATUS_SUCCESS);

    association.release().unwrap();
    scp.join().unwrap().unwrap();
}

#[test]
fn scu_scp_store() {
    let storage = Arc::new(CollectingStorage::default());
    let options = ServerAssociationOptions::new()
        .with_provider(Arc::new(VerificationProvider))
        .with_provider(storage.clone())
        .max_pdu_length(4_096);
    let (scp, addr) = spawn_scp(options).unwrap();

    let mut association = ClientAssociationOptions::new()
        .with_service_user(&VerificationUser)
        .with_service_user(&StorageUser)
        .with_abstract_syntax(uids::CT_IMAGE_STORAGE)
        .establish(addr)
        .unwrap();

    // the CT class has no provider on the other side
    let accepted: Vec<_> = association
        .presentation_contexts()
        .iter()
        .map(|pc| (pc.id, pc.is_accepted()))
        .collect();
    assert_eq!(accepted, vec![(1, true), (3, true), (5, false)]);
    assert_eq!(association.peer_max_pdu_length(), 4_096);

    let data_set = DicomObject::from_iter([
        VrElement::from_str(tags::SOP_CLASS_UID, VR::UI, uids::SECONDARY_CAPTURE_IMAGE_STORAGE),
        VrElement::from_str(tags::SOP_INSTANCE_UID, VR::UI, "2.25.1234"),
        VrElement::from_str(tags::PATIENT_NAME, VR::PN, "Doe^Jane"),
        VrElement::from_u16s(tags::ROWS, VR::US, &[64]),
        VrElement::from_u16s(tags::COLUMNS, VR::US, &[64]),
        VrElement::new(tags::PIXEL_DATA, VR::OW, vec![0x5A; 64 * 64 * 2]),
    ]);

    let pc_id = association
        .context_for(uids::SECONDARY_CAPTURE_IMAGE_STORAGE)
        .unwrap()
        .id;
    let ts = association.transfer_syntax_of(pc_id).unwrap();
    assert_eq!(ts.uid(), EXPLICIT_VR_LITTLE_ENDIAN.uid());

    let rq = dimse::c_store_rq(
        1,
        uids::SECONDARY_CAPTURE_IMAGE_STORAGE,
        "2.25.1234",
        dimse::PRIORITY_MEDIUM,
    );
    association.write_command(pc_id, &rq).unwrap();
    association.write_message(pc_id, &data_set).unwrap();

    let (id, rsp) = association.read_command().unwrap();
    assert_eq!(id, pc_id);
    assert_eq!(dimse::command_field(&rsp).unwrap(), dimse::C_STORE_RSP);
    assert_eq!(dimse::status(&rsp).unwrap(), dimse::STATUS_SUCCESS);
    assert_eq!(dimse::affected_sop_instance_uid(&rsp).unwrap(), "2.25.1234");

    association.release().unwrap();
    scp.join().unwrap().unwrap();

    let objects = storage.objects.lock().unwrap();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0], data_set);
}

#[test]
fn scp_rejects_unknown_called_ae_title() {
    let options = ServerAssociationOptions::new()
        .accept_called_ae_title()
        .ae_title(SCP_AE_TITLE)
        .with_provider(Arc::new(VerificationProvider));
    let (scp, addr) = spawn_scp(options).unwrap();

    let outcome = ClientAssociationOptions::new()
        .called_ae_title("SOMEONE-ELSE")
        .with_service_user(&VerificationUser)
        .establish(addr);
    match outcome {
        Err(Error::Rejected { association_rj }) => assert_eq!(
            association_rj.source,
            AssociationRJSource::ServiceUser(
                AssociationRJServiceUserReason::CalledAETitleNotRecognized
            )
        ),
        other => panic!("Expected a rejection, got {:?}", other.map(|_| ())),
    }
    assert_matches!(scp.join().unwrap(), Err(Error::Rejected { .. }));
}

#[test]
fn no_accepted_presentation_contexts() {
    let options = ServerAssociationOptions::new().with_provider(Arc::new(VerificationProvider));
    let (scp, addr) = spawn_scp(options).unwrap();

    let outcome = ClientAssociationOptions::new()
        .with_abstract_syntax(uids::MR_IMAGE_STORAGE)
        .establish(addr);
    assert_matches!(outcome, Err(Error::NoAcceptedPresentationContexts));
    // the requester aborts, which ends the acceptor's loop
    scp.join().unwrap().unwrap();
}

#[test]
fn provider_replies_with_data_set() -> Result<()> {
    let options = ServerAssociationOptions::new().with_provider(Arc::new(RawEcho));
    let (scp, addr) = spawn_scp(options)?;

    let mut association = ClientAssociationOptions::new()
        .with_service_user(&StorageUser)
        .establish(addr)?;
    let pc_id = association
        .context_for(uids::SECONDARY_CAPTURE_IMAGE_STORAGE)
        .map(|pc| pc.id)
        .ok_or("no presentation context")?;

    let data_set = DicomObject::from_iter([VrElement::from_str(
        tags::SOP_INSTANCE_UID,
        VR::UI,
        "2.25.99",
    )]);
    let rq = dimse::c_store_rq(9, uids::SECONDARY_CAPTURE_IMAGE_STORAGE, "2.25.99", 0);
    association.write_command(pc_id, &rq)?;
    association.write_message(pc_id, &data_set)?;

    let (_, rsp) = association.read_command()?;
    assert_eq!(dimse::message_id_responded_to(&rsp)?, 9);
    let (_, echoed) = association.read_message()?;
    assert_eq!(echoed, data_set);

    association.release()?;
    scp.join().unwrap()?;
    Ok(())
}

/// Sends back every data set it receives after a success response.
#[derive(Debug)]
struct RawEcho;

impl ServiceClassProvider for RawEcho {
    fn sop_class_uids(&self) -> &[&str] {
        &[uids::SECONDARY_CAPTURE_IMAGE_STORAGE]
    }

    fn process_command(
        &self,
        context: &mut CommandContext<'_>,
        command: &DicomObject,
        data_set: Option<DataSetReader>,
    ) -> std::result::Result<(), HandlerError> {
        let mut data_set = data_set.ok_or("missing data set")?;
        let mut bytes = Vec::new();
        data_set.read_to_end(&mut bytes)?;
        let obj = dcmlink_encoding::read_object(
            &bytes,
            data_set.transfer_syntax(),
            context.dictionary(),
        )?;
        context.write_command(&dimse::c_store_rsp(
            dimse::message_id(command)?,
            uids::SECONDARY_CAPTURE_IMAGE_STORAGE,
            &dimse::affected_sop_instance_uid(command)?,
            dimse::STATUS_SUCCESS,
        ))?;
        context.write_message(&obj)?;
        Ok(())
    }
}
