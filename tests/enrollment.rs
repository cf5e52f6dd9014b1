//! Full enrollment: build, protect, send and format.

#![cfg(all(feature = "http", feature = "pem"))]

mod common;

use cmp_client::cmpv2::body::PkiBody;
use cmp_client::pem::CERTIFICATE_LABEL;
use cmp_client::x509_cert::ext::pkix::name::GeneralName;
use cmp_client::{
    protect, Error, ErrorKind, HttpTransport, KeyGenParameters, ProtectedMessage,
    ProtectionParameters, RequestBuilder, ServerEndpoint,
};
use common::{ok_response, protection_parameters, public_key, MockResponder};
use rand_chacha::{rand_core::SeedableRng, ChaCha8Rng};
use std::time::Duration;

#[test]
fn enroll_with_shared_secret() {
    let request = RequestBuilder::new("CN=test,O=Org", "CN=CA,O=Org", 1)
        .build(&public_key(42))
        .unwrap();
    let params = protection_parameters();
    let mut rng = ChaCha8Rng::from_seed([1; 32]);
    let message = protect(&mut rng, request, &params).unwrap();

    // responder echoes the request back
    let server = MockResponder::serve(Duration::ZERO, |request| ok_response(&request.body));
    let endpoint = ServerEndpoint::new("127.0.0.1", server.port(), "/ejbca/publicweb/cmp/ra");
    let response = HttpTransport::new()
        .send(&message, &endpoint, Some(Duration::from_secs(10)))
        .unwrap();
    server.join();

    let echoed = ProtectedMessage::try_from(response.decode().unwrap()).unwrap();
    let header = echoed.header();
    assert_eq!(header.sender_nonce.as_ref().unwrap().as_bytes(), [1; 6]);
    assert_eq!(header.trans_id.as_ref().unwrap().as_bytes(), [0]);
    assert_eq!(header.sender_kid.as_ref().unwrap().as_bytes(), b"1");
    assert!(matches!(
        &header.recipient,
        GeneralName::DirectoryName(name) if name.to_string() == "CN=CA,O=Org"
    ));

    match echoed.body() {
        PkiBody::Cr(requests) => {
            assert_eq!(requests.len(), 1);
            let cert_req = &requests[0].cert_req;
            assert_eq!(cert_req.cert_req_id.as_bytes(), [1]);
            assert_eq!(
                cert_req.cert_template.subject.as_ref().unwrap().to_string(),
                "CN=test,O=Org"
            );
        }
        other => panic!("unexpected body {other:?}"),
    }

    echoed.verify_with_secret(b"password").unwrap();
    let err = echoed.verify_with_secret(b"wrong").unwrap_err();
    assert!(matches!(err, Error::VerificationFailed));
    assert_eq!(err.kind(), ErrorKind::Protection);

    let pem = response.to_pem(CERTIFICATE_LABEL).unwrap();
    assert!(pem.starts_with("-----BEGIN CERTIFICATE-----\n"));
    assert!(pem.lines().all(|line| line.len() <= 64));
    let (label, der) = pem_rfc7468::decode_vec(pem.as_bytes()).unwrap();
    assert_eq!(label, CERTIFICATE_LABEL);
    assert_eq!(der, response.raw_bytes());
}

#[test]
fn enroll_with_generated_key() {
    let mut rng = ChaCha8Rng::from_seed([9; 32]);
    let (request, key_pair) = RequestBuilder::new("CN=new, O=HYS", "CN=ManagementCA", 2)
        .build_with_generated_key(&mut rng, &KeyGenParameters::new("RSA", 1024).unwrap())
        .unwrap();
    assert_eq!(request.subject().to_string(), "CN=new,O=HYS");
    assert!(key_pair.as_rsa().is_some());

    let params = ProtectionParameters::generate(&mut rng, "secret", "endentity").unwrap();
    let message = protect(&mut rng, request, &params).unwrap();

    let der = message.to_der().unwrap();
    let decoded = ProtectedMessage::from_der(&der).unwrap();
    assert_eq!(decoded, message);
    decoded.verify_with_secret(b"secret").unwrap();
}

#[test]
fn malformed_subject_is_a_configuration_error() {
    let mut rng = ChaCha8Rng::from_seed([3; 32]);
    let err = RequestBuilder::new("not a name", "CN=CA", 1)
        .build_with_generated_key(&mut rng, &KeyGenParameters::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}
