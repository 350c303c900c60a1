mod test_single_participant_joins_room;
mod test_unauthorized_connection_closed;
