use bytes::Bytes;
use proptest::prelude::*;
use skein_protocol::{ClientId, Message, PacketType, Request, WireLimits};

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime")
        .block_on(future)
}

/// Event names including empty and non-ASCII ones.
fn arb_event() -> impl Strategy<Value = String> {
    prop_oneof![Just(String::new()), "[a-z]{1,12}", "\\PC{0,32}"]
}

fn arb_payload() -> impl Strategy<Value = Bytes> {
    prop::collection::vec(any::<u8>(), 0..4096).prop_map(Bytes::from)
}

fn arb_request() -> impl Strategy<Value = Request> {
    prop_oneof![
        Just(Request::GetId),
        Just(Request::GetClients),
        (arb_event(), any::<u32>(), arb_payload()).prop_map(|(event, target, payload)| {
            Request::SendTo {
                event,
                target: ClientId::new(target),
                payload,
            }
        }),
        (arb_event(), arb_payload())
            .prop_map(|(event, payload)| Request::SendAll { event, payload }),
    ]
}

proptest! {
    /// Any request decodes to itself and consumes exactly its encoding.
    #[test]
    fn roundtrip_request(request in arb_request()) {
        let (decoded, rest) = block_on(async {
            let mut bytes = Vec::new();
            request.write_to(&mut bytes).await.expect("encode");
            bytes.extend_from_slice(b"trailing");

            let mut input = bytes.as_slice();
            let decoded = Request::read_from(&mut input, &WireLimits::default())
                .await
                .expect("decode");
            (decoded, input.to_vec())
        });

        prop_assert_eq!(&decoded, &request);
        prop_assert_eq!(rest, b"trailing".to_vec());
    }

    /// Any pushed message decodes to itself.
    #[test]
    fn roundtrip_message(event in arb_event(), sender in any::<u32>(), payload in arb_payload()) {
        let message = Message::new(event, ClientId::new(sender), payload);
        let decoded = block_on(async {
            let mut bytes = Vec::new();
            message.write_to(&mut bytes).await.expect("encode");

            let mut input = bytes.as_slice();
            let packet = skein_protocol::wire::read_packet(&mut input).await.expect("tag");
            assert_eq!(packet, PacketType::Message);
            Message::read_body(&mut input, &WireLimits::default()).await.expect("decode")
        });

        prop_assert_eq!(decoded, message);
    }

    /// Every proper prefix of an encoding is a decode error, never a panic
    /// or a bogus success.
    #[test]
    fn truncated_request_is_rejected(request in arb_request(), cut in any::<prop::sample::Index>()) {
        let result = block_on(async {
            let mut bytes = Vec::new();
            request.write_to(&mut bytes).await.expect("encode");
            let len = cut.index(bytes.len());

            let mut input = &bytes[..len];
            Request::read_from(&mut input, &WireLimits::default()).await
        });

        prop_assert!(result.is_err());
    }
}
