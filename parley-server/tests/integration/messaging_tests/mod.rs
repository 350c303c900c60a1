mod test_media_state_broadcast;
mod test_relay_rejections;
