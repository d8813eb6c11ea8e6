use rclcore::ServiceType;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AddTwoIntsRequest {
    pub a: i64,
    pub b: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AddTwoIntsResponse {
    pub sum: i64,
}

/// `example_interfaces/srv/AddTwoInts`.
pub struct AddTwoInts;

impl ServiceType for AddTwoInts {
    type Request = AddTwoIntsRequest;
    type Response = AddTwoIntsResponse;
}
