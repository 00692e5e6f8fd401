//! Constructors for the non-handshake control packets this engine sends: keepalive, light-ack,
//! shutdown. Nak, AckAck, CongestionWarning and DropRequest are recognized on receipt (see
//! [`super::connection::Connection::on_control`]) but never constructed here, since this engine
//! never sends them.
use super::packet::{ControlPacket, ControlPacketType};
use super::sequence::Sequence;

fn base(control_type: ControlPacketType, type_specific: u32, timestamp: u32, destination_socket_id: u32) -> ControlPacket {
    ControlPacket {
        control_type,
        subtype: 0,
        type_specific,
        timestamp,
        destination_socket_id,
    }
}

pub fn keepalive(timestamp: u32, destination_socket_id: u32) -> ControlPacket {
    base(ControlPacketType::Keepalive, 0, timestamp, destination_socket_id)
}

/// A Light-ACK: the cumulative-ack sequence number is sent as "last contiguous sequence + 1",
/// matching the wire convention that an ACK names the next sequence the sender expects.
pub fn light_ack(cumulative_ack: Sequence, timestamp: u32, destination_socket_id: u32) -> ControlPacket {
    base(
        ControlPacketType::Ack,
        (cumulative_ack + 1).get(),
        timestamp,
        destination_socket_id,
    )
}

pub fn shutdown(timestamp: u32, destination_socket_id: u32) -> ControlPacket {
    base(ControlPacketType::Shutdown, 0, timestamp, destination_socket_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_light_ack_encodes_next_expected() {
        let p = light_ack(Sequence::from(41), 0, 1);
        assert_eq!(p.type_specific, 42);
    }
}
