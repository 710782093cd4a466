//! Imports producing call output: return data, logs and user errors.

use super::memory;
use crate::error::VmError;
use crate::host::VmHost;

const TOPIC_LEN: usize = 32;

pub fn write_log(
    host: &VmHost,
    memory: &mut [u8],
    payload_offset: i32,
    payload_length: i32,
    topics_offset: i32,
    num_topics: i32,
) -> Result<(), VmError> {
    let schedule = host.schedule();
    let topics = u64::try_from(num_topics).map_err(|_| VmError::ExecutionFailed(format!("negative topic count {}", num_topics)))?;
    let cost = schedule
        .ei_api_cost
        .log
        .saturating_add(schedule.ei_api_cost.log_per_topic.saturating_mul(topics))
        .saturating_add(
            schedule
                .base_operation_cost
                .data_copy_per_byte
                .saturating_mul(payload_length.max(0) as u64),
        );
    host.use_gas(cost)?;

    let payload = memory::load(memory, payload_offset, payload_length)?.to_vec();
    let topics_length = num_topics
        .checked_mul(TOPIC_LEN as i32)
        .ok_or(VmError::MemoryAccessOutOfBounds {
            offset: i64::from(topics_offset),
            length: i64::from(num_topics) * TOPIC_LEN as i64,
        })?;
    let topics = memory::load(memory, topics_offset, topics_length)?
        .chunks_exact(TOPIC_LEN)
        .map(|chunk| {
            let mut topic = [0u8; TOPIC_LEN];
            topic.copy_from_slice(chunk);
            topic
        })
        .collect();

    let address = host.storage().address();
    host.output().write_log(address, topics, payload);
    Ok(())
}

/// Flag the frame as failed by the contract itself and stop it.
pub fn signal_error(host: &VmHost, _memory: &mut [u8]) -> Result<(), VmError> {
    host.use_gas(host.schedule().ei_api_cost.signal_error)?;
    host.output().signal_user_error();
    Err(VmError::UserSignaledError)
}

pub fn return_big_int(host: &VmHost, _memory: &mut [u8], handle: i32) -> Result<(), VmError> {
    host.use_gas(host.schedule().big_int_api_cost.big_int_finish)?;
    let bytes = host.bigint().get_bytes(handle)?;
    host.use_gas(host.schedule().base_operation_cost.data_copy_per_byte * bytes.len() as u64)?;
    host.output().finish(bytes);
    Ok(())
}

pub fn return_int32(host: &VmHost, _memory: &mut [u8], value: i32) -> Result<(), VmError> {
    host.use_gas(host.schedule().ei_api_cost.int64_finish)?;
    host.output().finish(super::encode_int32(value));
    Ok(())
}

pub fn finish(host: &VmHost, memory: &mut [u8], data_offset: i32, length: i32) -> Result<(), VmError> {
    let schedule = host.schedule();
    let per_byte = schedule.base_operation_cost.data_copy_per_byte;
    host.use_gas(schedule.ei_api_cost.finish.saturating_add(per_byte.saturating_mul(length.max(0) as u64)))?;
    let data = memory::load(memory, data_offset, length)?.to_vec();
    host.output().finish(data);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::tests::{addr, host_in_call};
    use crate::mock::MockWorld;
    use crate::runtime::CallInput;

    fn host(gas: u64) -> VmHost {
        host_in_call(MockWorld::new(), CallInput::new(addr(1), addr(2), "main", gas)).0
    }

    #[test]
    fn test_return_data_sequence() {
        let host = host(100_000);
        let mut memory = b"ok".to_vec();
        finish(&host, &mut memory, 0, 2).unwrap();
        return_int32(&host, &mut memory, 1 << 24).unwrap();
        let handle = host.bigint().new_value(64);
        return_big_int(&host, &mut memory, handle).unwrap();
        return_int32(&host, &mut memory, 0).unwrap();

        assert_eq!(
            host.output().return_data(),
            &[b"ok".to_vec(), vec![1, 0, 0, 0], vec![64], vec![]]
        );
    }

    #[test]
    fn test_write_log() {
        let host = host(100_000);
        let mut memory = vec![0u8; 80];
        memory[..5].copy_from_slice(b"event");
        memory[16..48].fill(1);
        memory[48..80].fill(2);

        write_log(&host, &mut memory, 0, 5, 16, 2).unwrap();

        let output = host.output();
        let log = &output.logs()[0];
        assert_eq!(log.address, addr(2));
        assert_eq!(log.topics, vec![[1u8; 32], [2u8; 32]]);
        assert_eq!(log.data, b"event".to_vec());
    }

    #[test]
    fn test_write_log_charges_per_topic() {
        let host = host(1_000_000);
        let mut memory = vec![0u8; 128];
        let before = host.metering().gas_used();
        write_log(&host, &mut memory, 0, 0, 0, 0).unwrap();
        let bare = host.metering().gas_used() - before;

        let before = host.metering().gas_used();
        write_log(&host, &mut memory, 0, 0, 0, 3).unwrap();
        let with_topics = host.metering().gas_used() - before;
        assert_eq!(with_topics - bare, 3 * host.schedule().ei_api_cost.log_per_topic);
    }

    #[test]
    fn test_write_log_rejects_bad_topics() {
        let host = host(1_000_000);
        let mut memory = vec![0u8; 40];
        assert!(write_log(&host, &mut memory, 0, 0, 0, 2).is_err());
        assert!(write_log(&host, &mut memory, 0, 0, 0, -1).is_err());
        assert!(host.output().logs().is_empty());
    }

    #[test]
    fn test_signal_error_sets_flag() {
        let host = host(10_000);
        let mut memory = Vec::<u8>::new();
        assert_eq!(signal_error(&host, &mut memory), Err(VmError::UserSignaledError));
        assert!(host.output().has_user_error());
    }
}
