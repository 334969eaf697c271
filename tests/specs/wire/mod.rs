mod queue_messages;
