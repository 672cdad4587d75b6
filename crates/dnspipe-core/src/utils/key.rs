//! Canonical DNS message fingerprints and stock replies.

use hickory_proto::error::ProtoResult;
use hickory_proto::op::{Message, MessageType, Query, ResponseCode};
use hickory_proto::rr::rdata::opt::EdnsCode;

/// Canonical byte fingerprint of a query, used as the dedup key.
///
/// Two messages produce equal keys exactly when they are semantically the
/// same request: question names are lowercased, the transaction id is
/// zeroed, and EDNS padding is dropped before serializing to wire format.
pub fn message_key(msg: &Message) -> ProtoResult<Vec<u8>> {
    let mut canon = msg.clone();
    canon.set_id(0);

    let queries: Vec<Query> = canon
        .take_queries()
        .into_iter()
        .map(|q| {
            let mut lowered = Query::query(q.name().to_lowercase(), q.query_type());
            lowered.set_query_class(q.query_class());
            lowered
        })
        .collect();
    canon.add_queries(queries);

    if let Some(edns) = canon.extensions_mut() {
        edns.options_mut().remove(EdnsCode::Padding);
    }

    canon.to_vec()
}

/// A SERVFAIL response mirroring the query's question and id.
pub fn servfail_reply(query: &Message) -> Message {
    let mut response = Message::new();
    response.set_id(query.id());
    response.set_message_type(MessageType::Response);
    response.set_op_code(query.op_code());
    response.set_recursion_desired(query.recursion_desired());
    response.set_response_code(ResponseCode::ServFail);
    response.add_queries(query.queries().to_vec());
    response
}
