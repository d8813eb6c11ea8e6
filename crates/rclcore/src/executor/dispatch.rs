use crate::{
    error::Result,
    executable::{AnyExecutable, ExecutableKind},
};

/// Runs one selected work item to completion on the calling thread.
///
/// `Ok(())` also covers the case where the entity had nothing to take, which
/// happens when a notification raced with another consumer.
///
/// # Errors
///
/// Propagates allocation, transport and handler errors of the entity.
pub fn execute_any_executable(executable: &AnyExecutable) -> Result<()> {
    match executable.kind() {
        ExecutableKind::Subscription(subscription) => {
            let mut message = subscription.create_message()?;
            if subscription.take_message(&mut message)? {
                subscription.handle_message(message)?;
            }
        }
        ExecutableKind::Timer(timer) => timer.execute_callback()?,
        ExecutableKind::Service(service) => {
            let mut header = service.create_request_identifier()?;
            let mut request = service.create_request()?;
            if service.take_request(&mut header, &mut request)? {
                service.handle_request(header, request)?;
            }
        }
        ExecutableKind::Client(client) => {
            let mut header = client.create_request_header()?;
            let mut response = client.create_response()?;
            if client.take_response(&mut header, &mut response)? {
                client.handle_response(header, response)?;
            }
        }
    }
    Ok(())
}
